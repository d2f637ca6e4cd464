use super::models::UpdateTokenRequest;

/// A token field that can be updated in place.
///
/// Each field has a fixed slot in `updateToken` and a dedicated event the
/// contract emits when the field changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenField {
    AssetUri,
    AssetHash,
    MetadataUri,
    MetadataHash,
    AdditionalData,
}

impl TokenField {
    /// In `updateToken` argument order, after the token id.
    pub const ALL: [TokenField; 5] = [
        TokenField::AssetUri,
        TokenField::AssetHash,
        TokenField::MetadataUri,
        TokenField::MetadataHash,
        TokenField::AdditionalData,
    ];

    pub fn position(self) -> usize {
        match self {
            TokenField::AssetUri => 0,
            TokenField::AssetHash => 1,
            TokenField::MetadataUri => 2,
            TokenField::MetadataHash => 3,
            TokenField::AdditionalData => 4,
        }
    }

    pub fn event(self) -> &'static str {
        match self {
            TokenField::AssetUri => "AssetUriSet",
            TokenField::AssetHash => "AssetHashSet",
            TokenField::MetadataUri => "MetadataUriSet",
            TokenField::MetadataHash => "MetadataHashSet",
            TokenField::AdditionalData => "AdditionalDataSet",
        }
    }

    /// Name of the field's parameter in its event and in `getToken`.
    pub fn param(self) -> &'static str {
        match self {
            TokenField::AssetUri => "assetUri",
            TokenField::AssetHash => "assetHash",
            TokenField::MetadataUri => "metadataUri",
            TokenField::MetadataHash => "metadataHash",
            TokenField::AdditionalData => "additionalData",
        }
    }
}

/// Event kinds that count as a modification of a token.
pub fn update_event_kinds() -> [&'static str; 5] {
    TokenField::ALL.map(TokenField::event)
}

impl UpdateTokenRequest {
    /// The fields the payload sets, in `updateToken` order.
    pub fn fields(&self) -> Vec<(TokenField, &str)> {
        let asset = self.asset.as_ref();
        let metadata = self.metadata.as_ref();

        [
            (TokenField::AssetUri, asset.and_then(|doc| doc.uri.as_deref())),
            (TokenField::AssetHash, asset.and_then(|doc| doc.hash.as_deref())),
            (TokenField::MetadataUri, metadata.and_then(|doc| doc.uri.as_deref())),
            (TokenField::MetadataHash, metadata.and_then(|doc| doc.hash.as_deref())),
            (TokenField::AdditionalData, self.additional_data.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|value| (field, value)))
        .collect()
    }

    /// The first field set to an empty string. The contract reads an empty
    /// argument as "keep the stored value", so such a field cannot be sent.
    pub fn cleared_field(&self) -> Option<TokenField> {
        self.fields()
            .into_iter()
            .find(|(_, value)| value.is_empty())
            .map(|(field, _)| field)
    }

    /// Positional `updateToken` string arguments. Unset fields become empty
    /// strings, which the contract treats as "keep the stored value".
    pub fn update_args(&self) -> [String; 5] {
        let mut args: [String; 5] = Default::default();
        for (field, value) in self.fields() {
            args[field.position()] = value.to_owned();
        }
        args
    }
}
