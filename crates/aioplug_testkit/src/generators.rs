//! Property-based test generators using proptest.

use aioplug_device::{DeviceConfig, ElementType, IoBuffer};
use proptest::prelude::*;

/// Strategy for element types.
pub fn element_type_strategy() -> impl Strategy<Value = ElementType> {
    prop::sample::select(ElementType::ALL.to_vec())
}

/// Strategy for buffers of up to `max_elements` elements with random content.
pub fn buffer_strategy(max_elements: usize) -> impl Strategy<Value = IoBuffer> {
    (element_type_strategy(), 0..=max_elements).prop_flat_map(|(dtype, count)| {
        prop::collection::vec(any::<u8>(), count * dtype.size_in_bytes()).prop_map(move |bytes| {
            IoBuffer::from_bytes(dtype, bytes).expect("Byte count is a whole number of elements")
        })
    })
}

/// Strategy for names the loader accepts.
pub fn backend_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for valid device configurations.
pub fn device_config_strategy() -> impl Strategy<Value = DeviceConfig> {
    (
        prop::sample::select(vec![512usize, 4096, 65536, 1 << 20]),
        1usize..=128,
        any::<bool>(),
        any::<bool>(),
        1usize..=8,
        1usize..=4096,
    )
        .prop_map(
            |(block_size, queue_depth, single_submit, overlap_events, threads, max_pending)| {
                DeviceConfig::new()
                    .with_block_size(block_size)
                    .with_queue_depth(queue_depth)
                    .with_single_submit(single_submit)
                    .with_overlap_events(overlap_events)
                    .with_thread_count(threads)
                    .with_max_pending(max_pending)
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn buffers_hold_whole_elements(buffer in buffer_strategy(64)) {
            prop_assert!(buffer.len() <= 64);
            prop_assert_eq!(buffer.byte_len(), buffer.len() * buffer.dtype().size_in_bytes());
        }

        #[test]
        fn configs_are_valid(config in device_config_strategy()) {
            prop_assert!(config.validate().is_ok());
        }

        #[test]
        fn names_have_no_separators(name in backend_name_strategy()) {
            prop_assert!(!name.is_empty());
            prop_assert!(!name.contains('/'));
        }
    }
}
