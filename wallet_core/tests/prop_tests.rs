use proptest::prelude::*;
use serde_json::{json, Value};

use troll_types::RawAmount;
use troll_wallet_core::keystore::{decrypt_seed, encrypt_seed, KdfParams};
use troll_wallet_core::representatives::{weight_percent, TOTAL_SUPPLY};
use troll_wallet_core::{Migrator, CURRENT_SCHEMA_VERSION};

const FAST: KdfParams = KdfParams {
    memory: 1024,
    iterations: 1,
    parallelism: 1,
};

/// Percent in thousandths, for comparing values of different scales.
fn milli_percent(weight: u128) -> u128 {
    let p = weight_percent(RawAmount::new(weight));
    p.mantissa() * 10u128.pow(3 - p.scale())
}

fn legacy_doc() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        "[a-z0-9]{1,12}".prop_map(|s| Value::String(format!("ttk_{s}"))),
        "[a-z0-9]{1,12}".prop_map(Value::String),
        any::<u32>().prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn contains_legacy(value: &Value) -> bool {
    match value {
        Value::String(s) => s.starts_with("ttk_"),
        Value::Array(items) => items.iter().any(contains_legacy),
        Value::Object(map) => map.values().any(contains_legacy),
        _ => false,
    }
}

proptest! {
    /// Percent of supply never exceeds 100 and never decreases with weight.
    #[test]
    fn weight_percent_is_bounded_and_monotone(
        a in 0u128..=TOTAL_SUPPLY.raw(),
        b in 0u128..=TOTAL_SUPPLY.raw(),
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(milli_percent(lo) <= milli_percent(hi));
        prop_assert!(milli_percent(hi) <= 100_000);
    }

    /// After migrating a version 1 document no legacy address is left, and a
    /// second run changes nothing.
    #[test]
    fn migration_removes_every_legacy_address(body in legacy_doc()) {
        let mut doc = json!({ "version": 1, "body": body });
        prop_assert_eq!(Migrator::run(&mut doc).unwrap(), 1);
        prop_assert!(!contains_legacy(&doc));
        prop_assert_eq!(&doc["version"], &json!(CURRENT_SCHEMA_VERSION));

        let before = doc.clone();
        prop_assert_eq!(Migrator::run(&mut doc).unwrap(), CURRENT_SCHEMA_VERSION);
        prop_assert_eq!(doc, before);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// The seed comes back only with the password it was sealed under.
    #[test]
    fn keystore_opens_only_with_its_password(
        seed in prop::array::uniform32(any::<u8>()),
        password in "[ -~]{0,24}",
        wrong in "[ -~]{1,24}",
    ) {
        let sealed = encrypt_seed(&seed, &password, FAST).unwrap();
        prop_assert_eq!(*decrypt_seed(&sealed, &password).unwrap(), seed);
        if wrong != password {
            prop_assert!(decrypt_seed(&sealed, &wrong).is_err());
        }
    }
}
