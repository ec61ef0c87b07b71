//! End-to-end fixture scenario exercising index composition, aggregates,
//! rollback, and key upsert/delete idempotency together, in the shape of
//! spec.md §8's scenario list.

use chunkstore_core::collection::{Collection, CollectionOptions};
use chunkstore_core::column::ColumnKind;
use chunkstore_core::error::Error;
use chunkstore_core::value::Value;

const RACES: &[&str] = &["human", "elf", "dwarf", "orc"];
const CLASSES: &[&str] = &["mage", "warrior", "rogue"];
const ROW_COUNT: usize = 500;

fn fixture() -> Collection {
    let players = Collection::new("players");
    players.create_column("name", ColumnKind::String).unwrap();
    players.create_column("age", ColumnKind::Float64).unwrap();
    players.create_column("race", ColumnKind::Enum).unwrap();
    players.create_column("class", ColumnKind::Enum).unwrap();
    players.create_column("balance", ColumnKind::Float64).unwrap();
    players.create_column("active", ColumnKind::Bool).unwrap();

    for i in 0..ROW_COUNT {
        let race = RACES[i % RACES.len()];
        let class = CLASSES[i % CLASSES.len()];
        let age = 18.0 + (i % 40) as f64;
        let balance = 1000.0 + (i as f64 * 7.0 % 3000.0);
        players
            .insert(|row| {
                row.set("name", format!("player-{i}"));
                row.set("age", age);
                row.set("race", Value::Enum(race.to_string()));
                row.set("class", Value::Enum(class.to_string()));
                row.set("balance", balance);
                row.set("active", i % 2 == 0);
                Ok(())
            })
            .unwrap();
    }
    players
}

fn build_indexes(players: &Collection) {
    for &race in RACES {
        players.create_index(race, "race", move |v| v.as_str().map(|s| s == race).unwrap_or(false)).unwrap();
    }
    players.create_index("mage", "class", |v| v.as_str().map(|s| s == "mage").unwrap_or(false)).unwrap();
    players.create_index("old", "age", |v| v.as_f64().map(|a| a >= 30.0).unwrap_or(false)).unwrap();
}

#[test]
fn index_composition_matches_manual_counts() {
    let players = fixture();
    build_indexes(&players);

    assert_eq!(players.count(), ROW_COUNT as u64);

    let human_count = (0..ROW_COUNT).filter(|i| RACES[i % RACES.len()] == "human").count();
    assert_eq!(players.query().with(&["human"]).count() as usize, human_count);

    let elf_or_dwarf = (0..ROW_COUNT)
        .filter(|i| matches!(RACES[i % RACES.len()], "elf" | "dwarf"))
        .count();
    assert_eq!(players.query().with(&["elf"]).union(&["dwarf"]).count() as usize, elf_or_dwarf);

    let none_of_three = (0..ROW_COUNT)
        .filter(|i| !matches!(RACES[i % RACES.len()], "elf" | "dwarf" | "human"))
        .count();
    assert_eq!(
        players.query().without(&["elf", "dwarf", "human"]).count() as usize,
        none_of_three
    );

    let human_mage_old = (0..ROW_COUNT)
        .filter(|i| {
            RACES[i % RACES.len()] == "human"
                && CLASSES[i % CLASSES.len()] == "mage"
                && (18.0 + (i % 40) as f64) >= 30.0
        })
        .count();
    assert_eq!(players.query().with(&["human", "mage", "old"]).count() as usize, human_mage_old);
}

#[test]
fn deleting_the_old_cohort_shrinks_subsequent_counts() {
    let players = fixture();
    build_indexes(&players);

    let old_count = players.query().with(&["old"]).count();
    let mut txn = players.query().with(&["old"]);
    txn.delete_all();
    txn.commit().unwrap();

    assert_eq!(players.count(), ROW_COUNT as u64 - old_count);
    let remaining_human_mage = players.query().with(&["human", "mage"]).count();
    let expected = (0..ROW_COUNT)
        .filter(|i| {
            RACES[i % RACES.len()] == "human"
                && CLASSES[i % CLASSES.len()] == "mage"
                && (18.0 + (i % 40) as f64) < 30.0
        })
        .count();
    assert_eq!(remaining_human_mage as usize, expected);
}

#[test]
fn dropping_an_index_clears_its_filter() {
    let players = fixture();
    players.create_index("rich", "balance", |v| v.as_f64().map(|b| b >= 3500.0).unwrap_or(false)).unwrap();

    let rich_before = players.query().with(&["rich"]).count();
    assert!(rich_before > 0);

    players.drop_index("rich");
    assert_eq!(players.query().with(&["rich"]).count(), 0);
}

#[test]
fn numeric_aggregates_match_manual_reduction() {
    let players = fixture();
    let balances: Vec<f64> =
        (0..ROW_COUNT).map(|i| 1000.0 + (i as f64 * 7.0 % 3000.0)).collect();
    let sum: f64 = balances.iter().sum();
    let avg = sum / balances.len() as f64;
    let min = balances.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = balances.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let txn = players.query();
    assert!((txn.sum::<f64>("balance").unwrap() - sum).abs() < 1e-6);
    assert!((txn.avg::<f64>("balance").unwrap() - avg).abs() < 1e-6);
    assert!((txn.min::<f64>("balance").unwrap().unwrap() - min).abs() < 1e-6);
    assert!((txn.max::<f64>("balance").unwrap().unwrap() - max).abs() < 1e-6);
}

#[test]
fn a_failed_writer_transaction_leaves_balances_and_indexes_untouched() {
    let players = fixture();
    players.create_index("rich", "balance", |v| v.as_f64().map(|b| b >= 3500.0).unwrap_or(false)).unwrap();
    let rich_before = players.query().with(&["rich"]).count();
    let sum_before = players.query().sum::<f64>("balance").unwrap();

    let mut txn = players.query();
    let handles: Vec<_> = {
        let mut v = Vec::new();
        txn.range(|h| v.push(h));
        v
    };
    for h in &handles {
        let mut writer = txn.update_row(*h).unwrap();
        writer.set("balance", 1.0_f64);
    }
    txn.rollback();

    assert!((players.query().sum::<f64>("balance").unwrap() - sum_before).abs() < 1e-6);
    assert_eq!(players.query().with(&["rich"]).count(), rich_before);
}

#[test]
fn upsert_key_is_idempotent_and_delete_key_errors_on_second_call() {
    let accounts = Collection::new("accounts");
    accounts.create_column("id", ColumnKind::Key).unwrap();
    accounts.create_column("balance", ColumnKind::Float64).unwrap();

    accounts
        .upsert_key("1", |row| {
            row.set("balance", 10.0);
            Ok(())
        })
        .unwrap();
    accounts
        .upsert_key("1", |row| {
            row.set("balance", 20.0);
            Ok(())
        })
        .unwrap();
    assert_eq!(accounts.count(), 1);

    let txn = accounts.query_key("1").unwrap();
    let balance: Option<f64> = txn.get::<f64>("balance", txn.select_first().unwrap()).unwrap();
    assert_eq!(balance, Some(20.0));

    accounts.delete_key("1").unwrap();
    let err = accounts.delete_key("1").unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn snapshot_round_trips_the_full_fixture() {
    let players = fixture();
    build_indexes(&players);

    let mut bytes = Vec::new();
    chunkstore_core::snapshot::write_snapshot(&players, &mut bytes).unwrap();

    let restored = Collection::new("players");
    restored.create_column("name", ColumnKind::String).unwrap();
    restored.create_column("age", ColumnKind::Float64).unwrap();
    restored.create_column("race", ColumnKind::Enum).unwrap();
    restored.create_column("class", ColumnKind::Enum).unwrap();
    restored.create_column("balance", ColumnKind::Float64).unwrap();
    restored.create_column("active", ColumnKind::Bool).unwrap();

    chunkstore_core::snapshot::read_snapshot(&restored, bytes.as_slice()).unwrap();

    assert_eq!(restored.count(), players.count());
    let original_sum = players.query().sum::<f64>("balance").unwrap();
    let restored_sum = restored.query().sum::<f64>("balance").unwrap();
    assert!((original_sum - restored_sum).abs() < 1e-6);
}

#[tokio::test(flavor = "multi_thread")]
async fn background_vacuum_sweeps_ttl_rows_during_normal_use() {
    use std::sync::Arc;
    use std::time::Duration;

    let sessions = Arc::new(Collection::with_options(
        "sessions",
        CollectionOptions { vacuum: Some(Duration::from_millis(20)), ..Default::default() },
    ));
    sessions.create_column("token", ColumnKind::String).unwrap();

    for i in 0..10 {
        sessions
            .insert_with_ttl(
                |row| {
                    row.set("token", format!("tok-{i}"));
                    Ok(())
                },
                Duration::from_millis(0),
            )
            .unwrap();
    }
    assert_eq!(sessions.count(), 10);

    let handle = chunkstore_core::vacuum::spawn(sessions.clone(), Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.stop().await;

    assert_eq!(sessions.count(), 0);
}
