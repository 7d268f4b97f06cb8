//! Property tests for client assembly.

use pooled_rpc::{EndpointOptions, Error, PoolOptions, ServiceDescription, build};
use proptest::prelude::*;
use rustc_hash::FxHashSet;

fn pool_options() -> impl Strategy<Value = PoolOptions> {
    (
        proptest::option::of(1usize..16),
        proptest::option::of(0usize..16),
        proptest::option::of(0u64..60_000),
        proptest::option::of(0u64..60_000),
        proptest::option::of(any::<bool>()),
        proptest::option::of(any::<bool>()),
    )
        .prop_map(|(max, min, idle, acquire, borrow, ret)| PoolOptions {
            max,
            min,
            idle_timeout_millis: idle,
            acquire_timeout_millis: acquire,
            test_on_borrow: borrow,
            test_on_return: ret,
        })
}

/// Endpoint options missing the host, the port, or both.
fn incomplete_endpoint() -> impl Strategy<Value = EndpointOptions> {
    prop_oneof![
        any::<u16>().prop_map(|port| EndpointOptions::default().with_port(port)),
        "[a-z]{1,12}".prop_map(|host| EndpointOptions::default().with_host(host)),
        Just(EndpointOptions::default()),
        Just(EndpointOptions::new("", 9090)),
    ]
}

proptest! {
    #[test]
    fn build_exposes_one_invoker_per_method(
        methods in proptest::collection::vec("[a-z][a-zA-Z0-9_]{0,11}", 0..24),
        options in pool_options(),
    ) {
        let service = ServiceDescription::new("Generated", methods.clone());
        let client = build(&service, options, EndpointOptions::new("127.0.0.1", 9090))
            .expect("valid endpoint");

        let unique: FxHashSet<&str> = methods.iter().map(String::as_str).collect();
        prop_assert_eq!(client.len(), unique.len());

        for name in &unique {
            let invoker = client.method(name);
            prop_assert!(invoker.is_some());
            prop_assert_eq!(invoker.map(|i| i.method()), Some(*name));
        }
    }

    #[test]
    fn build_without_host_or_port_fails_synchronously(
        options in pool_options(),
        endpoint in incomplete_endpoint(),
    ) {
        let service = ServiceDescription::new("Calculator", ["add"]);
        let err = build(&service, options, endpoint).unwrap_err();

        let is_config_error = matches!(err, Error::Config { .. });
        prop_assert!(is_config_error);
        let message = err.to_string();
        prop_assert!(message.contains("host") && message.contains("port"));
    }

    #[test]
    fn pool_min_never_exceeds_max(options in pool_options()) {
        let service = ServiceDescription::new("Calculator", ["add"]);
        let client = build(&service, options, EndpointOptions::new("127.0.0.1", 9090))
            .expect("valid options");

        let config = client.pool().config();
        prop_assert!(config.min <= config.max);
    }
}
