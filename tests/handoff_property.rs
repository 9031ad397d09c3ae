// tests/handoff_property.rs

use proptest::prelude::*;
use respawn::listeners::{BindUri, ENV_PREFIX, ListenerDescriptor, Scheme};
use respawn::listeners::{decode_inherit_vars, encode_inherit_vars};

fn descriptor_strategy() -> impl Strategy<Value = ListenerDescriptor> {
    let tcp = (
        prop_oneof![Just("127.0.0.1"), Just("0.0.0.0"), Just("localhost")],
        any::<u16>(),
        prop_oneof![Just(Scheme::Tcp), Just(Scheme::Ssl)],
    )
        .prop_map(|(host, port, scheme)| BindUri::new(scheme, format!("{host}:{port}")).unwrap());
    let unix = "[a-z0-9_/.-]{1,24}"
        .prop_map(|path| BindUri::new(Scheme::Unix, format!("/tmp/{path}")).unwrap());

    (prop_oneof![tcp, unix], 3..1024i32).prop_map(|(uri, fd)| ListenerDescriptor { uri, fd })
}

proptest! {
    // Whatever order the environment lists the variables in, decoding
    // yields the exporter's listener order.
    #[test]
    fn decode_recovers_exported_order(
        set in proptest::collection::vec(descriptor_strategy(), 0..12),
        shuffle_seed in any::<u64>(),
    ) {
        let mut vars = encode_inherit_vars(ENV_PREFIX, &set);
        vars.push(("PATH".to_string(), "/usr/bin".to_string()));

        // Deterministic shuffle driven by the seed.
        let n = vars.len();
        let mut seed = shuffle_seed;
        for i in (1..n).rev() {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let j = (seed >> 33) as usize % (i + 1);
            vars.swap(i, j);
        }

        let decoded = decode_inherit_vars(ENV_PREFIX, vars).unwrap();
        prop_assert_eq!(decoded, set);
    }
}
