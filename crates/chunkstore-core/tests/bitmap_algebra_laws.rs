//! Property tests for the bitmap-algebra laws spec.md §8 states as
//! invariants: union commutativity/associativity, `With(a).With(b) ==
//! With(a,b)`, `Without(a) == filter ANDNOT index(a)`, and merge
//! commutativity for a numeric column's default combiner.

use chunkstore_core::collection::Collection;
use chunkstore_core::column::ColumnKind;
use chunkstore_core::value::Value;
use proptest::prelude::*;

const TAGS: &[&str] = &["a", "b", "c", "d"];

fn tagged_collection(tag_per_row: &[Vec<&str>]) -> Collection {
    let collection = Collection::new("rows");
    collection.create_column("tags", ColumnKind::Any).unwrap();
    for tag in TAGS {
        let tag = (*tag).to_string();
        collection
            .create_index(&tag.clone(), "tags", move |v| match v {
                Value::Bytes(bytes) => bytes.windows(tag.len()).any(|w| w == tag.as_bytes()),
                _ => false,
            })
            .unwrap();
    }
    for tags in tag_per_row {
        let joined = tags.join(",");
        collection
            .insert(|row| {
                row.set("tags", joined.clone().into_bytes());
                Ok(())
            })
            .unwrap();
    }
    collection
}

fn arb_tag_assignment() -> impl Strategy<Value = Vec<Vec<&'static str>>> {
    prop::collection::vec(
        prop::collection::vec(prop::sample::select(TAGS), 0..TAGS.len()),
        1..40,
    )
}

proptest! {
    #[test]
    fn union_is_commutative(rows in arb_tag_assignment()) {
        let collection = tagged_collection(&rows);
        let ab = collection.query().union(&["a"]).union(&["b"]).count();
        let ba = collection.query().union(&["b"]).union(&["a"]).count();
        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn union_is_associative(rows in arb_tag_assignment()) {
        let collection = tagged_collection(&rows);
        let left = collection.query().union(&["a"]).union(&["b"]).union(&["c"]).count();
        let right = collection.query().union(&["a"]).union(&["b", "c"]).count();
        prop_assert_eq!(left, right);
    }

    #[test]
    fn with_chain_equals_with_many(rows in arb_tag_assignment()) {
        let collection = tagged_collection(&rows);
        let chained = collection.query().with(&["a"]).with(&["b"]).count();
        let combined = collection.query().with(&["a", "b"]).count();
        prop_assert_eq!(chained, combined);
    }

    #[test]
    fn without_equals_filter_andnot_index(rows in arb_tag_assignment()) {
        let collection = tagged_collection(&rows);
        let without_a = collection.query().without(&["a"]).count();
        let all = collection.query().count();
        let with_a = collection.query().with(&["a"]).count();
        prop_assert_eq!(without_a, all - with_a);
    }

    #[test]
    fn numeric_merge_is_commutative_within_one_commit(deltas in prop::collection::vec(-1000i64..1000, 1..20)) {
        let left_to_right = Collection::new("balances");
        left_to_right.create_column("value", ColumnKind::Int64).unwrap();
        left_to_right.insert(|row| { row.set("value", 0i64); Ok(()) }).unwrap();
        let handle = left_to_right.query().select_first().unwrap();

        for &delta in &deltas {
            let mut txn = left_to_right.query();
            let mut writer = txn.update_row(handle).unwrap();
            writer.merge("value", delta);
            txn.commit().unwrap();
        }
        let forward_total = left_to_right.query().sum::<i64>("value").unwrap();

        let reverse_order = Collection::new("balances");
        reverse_order.create_column("value", ColumnKind::Int64).unwrap();
        reverse_order.insert(|row| { row.set("value", 0i64); Ok(()) }).unwrap();
        let handle = reverse_order.query().select_first().unwrap();
        for &delta in deltas.iter().rev() {
            let mut txn = reverse_order.query();
            let mut writer = txn.update_row(handle).unwrap();
            writer.merge("value", delta);
            txn.commit().unwrap();
        }
        let reverse_total = reverse_order.query().sum::<i64>("value").unwrap();

        prop_assert_eq!(forward_total, reverse_total);
        prop_assert_eq!(forward_total, deltas.iter().sum::<i64>());
    }
}
