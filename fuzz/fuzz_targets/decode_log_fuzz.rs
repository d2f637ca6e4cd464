#![no_main]
use alloy_primitives::{
    Bytes,
    LogData,
    B256,
};
use libfuzzer_sys::fuzz_target;
use token_engine::{
    events::decode_log,
    primitives::Log,
    test_utils::{
        container_handle,
        segment_template,
        token_handle,
    },
};

/// Splits fuzzer data into a log of the token contract: the first byte picks
/// the topic count and which known selector (if any) seeds topic 0, the next
/// topics take 32 bytes each and the rest is the data section.
fn build_log(data: &[u8]) -> Log {
    let token = token_handle();
    let selectors: Vec<B256> = token
        .interface()
        .abi()
        .events()
        .map(|event| event.selector())
        .collect();

    let control = data[0];
    let topic_count = (control & 0x03) as usize + 1;
    let mut rest = &data[1..];

    let mut topics = Vec::with_capacity(topic_count);
    if control & 0x80 != 0 {
        topics.push(selectors[(control as usize >> 2) % selectors.len()]);
    }
    while topics.len() < topic_count && rest.len() >= 32 {
        topics.push(B256::from_slice(&rest[..32]));
        rest = &rest[32..];
    }

    Log {
        inner: alloy_primitives::Log {
            address: token.address(),
            data: LogData::new_unchecked(topics, Bytes::copy_from_slice(rest)),
        },
        block_number: Some(1),
        log_index: Some(0),
        ..Default::default()
    }
}

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let log = build_log(data);

    // Never panics, and anything decoded carries the log's position.
    if let Some(event) = decode_log(&token_handle(), &log) {
        assert_eq!(event.block_number, 1);
        assert!(token_handle().interface().event(&event.name).is_ok());
    }

    // Other contracts never claim a token log.
    assert!(decode_log(&container_handle(), &log).is_none());
    assert!(decode_log(&segment_template(), &log).is_none());
});
