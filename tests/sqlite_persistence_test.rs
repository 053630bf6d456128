use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use volume_sniper::application::ml::{ModelRegistry, ProbabilityEngine};
use volume_sniper::config::MlEnvConfig;
use volume_sniper::domain::ml::feature_registry::{FEATURE_NAMES, FeatureSchema, FeatureSnapshot};
use volume_sniper::domain::repositories::{ExperienceStore, ModelStore, StoredModel, TradeLedger};
use volume_sniper::domain::trading::trade_record::{ExperienceSample, NewTradeRecord, TradeStatus};
use volume_sniper::domain::trading::types::Side;
use volume_sniper::infrastructure::persistence::{
    Database, SqliteExperienceStore, SqliteModelStore, SqliteTradeLedger,
};

async fn memory_db() -> Database {
    Database::new("sqlite::memory:").await.unwrap()
}

fn record(symbol: &str, setup: &str, hour: u32) -> NewTradeRecord {
    NewTradeRecord {
        symbol: symbol.to_string(),
        side: Side::Long,
        quantity: dec!(0.25),
        entry: 1.0850,
        setup: setup.to_string(),
        snapshot: FeatureSnapshot::new(1_709_600_000).to_json().unwrap(),
        ticket: Some(1001),
        opened_at: Utc.with_ymd_and_hms(2024, 3, 5, hour, 15, 0).unwrap(),
    }
}

#[tokio::test]
async fn test_ledger_closes_exactly_once() {
    let db = memory_db().await;
    let ledger = SqliteTradeLedger::new(db.pool.clone());

    let id = ledger.insert(record("EURUSD", "VAL_Rej", 9)).await.unwrap();
    let open = ledger.open_records().await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, id);
    assert_eq!(open[0].status, TradeStatus::Open);
    assert_eq!(open[0].quantity, dec!(0.25));
    assert_eq!(open[0].ticket, Some(1001));

    assert!(ledger.close(id, dec!(-12.40)).await.unwrap());
    assert!(!ledger.close(id, dec!(99)).await.unwrap());
    assert!(ledger.open_records().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_traded_today_matches_exact_tag_and_day() {
    let db = memory_db().await;
    let ledger = SqliteTradeLedger::new(db.pool.clone());
    ledger.insert(record("EURUSD", "POC_Bounce_Long", 23)).await.unwrap();

    let day = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap().date_naive();
    assert!(ledger.has_traded_today("EURUSD", "POC_Bounce_Long", day).await.unwrap());
    assert!(!ledger.has_traded_today("EURUSD", "POC_Bounce", day).await.unwrap());
    assert!(!ledger.has_traded_today("XAUUSD", "POC_Bounce_Long", day).await.unwrap());
    let next_day = day.succ_opt().unwrap();
    assert!(!ledger.has_traded_today("EURUSD", "POC_Bounce_Long", next_day).await.unwrap());
}

#[tokio::test]
async fn test_minutes_since_last_trade_uses_latest_entry() {
    let db = memory_db().await;
    let ledger = SqliteTradeLedger::new(db.pool.clone());
    let now = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
    assert_eq!(ledger.minutes_since_last_trade("EURUSD", now).await.unwrap(), None);

    ledger.insert(record("EURUSD", "VAL_Rej", 9)).await.unwrap();
    ledger.insert(record("EURUSD", "VAH_Rej", 11)).await.unwrap();

    let minutes = ledger
        .minutes_since_last_trade("EURUSD", now)
        .await
        .unwrap()
        .unwrap();
    assert!((minutes - 45.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_experiences_append_and_load_per_symbol() {
    let db = memory_db().await;
    let store = SqliteExperienceStore::new(db.pool.clone());
    let mut snapshot = FeatureSnapshot::new(1_709_600_000);
    snapshot.set("rsi", 41.5);

    for (symbol, label) in [("EURUSD", 1u8), ("EURUSD", 0), ("XAUUSD", 1)] {
        store
            .append(&ExperienceSample {
                symbol: symbol.to_string(),
                snapshot: snapshot.clone(),
                label,
                recorded_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    let eur = store.load("EURUSD").await.unwrap();
    assert_eq!(eur.len(), 2);
    assert_eq!(eur[0].label, 1);
    assert_eq!(eur[1].label, 0);
    assert_eq!(eur[0].snapshot.get("rsi"), Some(41.5));
    assert_eq!(store.count().await.unwrap(), 3);
    assert_eq!(store.symbols().await.unwrap(), vec!["EURUSD", "XAUUSD"]);
}

#[tokio::test]
async fn test_model_store_upserts_by_symbol() {
    let db = memory_db().await;
    let store = SqliteModelStore::new(db.pool.clone());
    assert!(store.load("EURUSD").await.unwrap().is_none());

    let first = StoredModel {
        symbol: "EURUSD".to_string(),
        schema: FeatureSchema::current(),
        blob: "{\"v\":1}".to_string(),
        trained_at: Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap(),
    };
    store.save(&first).await.unwrap();

    let second = StoredModel {
        blob: "{\"v\":2}".to_string(),
        trained_at: first.trained_at + Duration::hours(1),
        ..first.clone()
    };
    store.save(&second).await.unwrap();

    let loaded = store.load("EURUSD").await.unwrap().unwrap();
    assert_eq!(loaded, second);
    assert_eq!(loaded.schema.len(), FeatureSchema::current().len());
}

#[tokio::test]
async fn test_zero_result_is_stored_for_force_closed_records() {
    let db = memory_db().await;
    let ledger = SqliteTradeLedger::new(db.pool.clone());
    let id = ledger
        .insert(NewTradeRecord {
            ticket: None,
            ..record("EURUSD", "VAH_Break", 10)
        })
        .await
        .unwrap();
    assert!(ledger.close(id, Decimal::ZERO).await.unwrap());
}

async fn record_alternating(engine: &ProbabilityEngine, count: usize) {
    for i in 0..count {
        let mut snapshot = FeatureSnapshot::new(1_709_600_000 + i as i64);
        for name in FEATURE_NAMES {
            snapshot.set(name, 0.5);
        }
        snapshot.set("rsi", if i % 2 == 0 { 72.0 } else { 28.0 });
        engine
            .record_experience("EURUSD", snapshot, (i % 2) as u8, Utc::now())
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_experience_retrain_stores_a_newer_model() {
    let db = memory_db().await;
    let models = Arc::new(SqliteModelStore::new(db.pool.clone()));
    let engine = ProbabilityEngine::new(
        Arc::new(ModelRegistry::new()),
        models.clone(),
        Arc::new(SqliteExperienceStore::new(db.pool.clone())),
        MlEnvConfig {
            n_trees: 5,
            max_depth: 3,
            ..MlEnvConfig::default()
        },
    );

    record_alternating(&engine, 10).await;
    let first_at = Utc.with_ymd_and_hms(2024, 3, 5, 22, 0, 0).unwrap();
    let first = engine
        .retrain_from_experience(&HashMap::new(), first_at)
        .await
        .unwrap();
    let first = first[0].1.clone().unwrap();
    assert_eq!(first.experiences, 10);

    record_alternating(&engine, 4).await;
    let second_at = first_at + Duration::days(1);
    let second = engine
        .retrain_from_experience(&HashMap::new(), second_at)
        .await
        .unwrap();
    let second = second[0].1.clone().unwrap();

    assert!(second.model.generation > first.model.generation);
    assert_eq!(second.experiences, 14);
    assert_eq!(second.total_rows, 70);
    let stored = models.load("EURUSD").await.unwrap().unwrap();
    assert_eq!(stored.trained_at, second_at);
}
