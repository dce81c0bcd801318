//! ModelRegistry: shared models, eager loading and schemas

use docstore::error::{Error, Result};
use docstore::record::FieldSpec;
use docstore::{
    Datum, FieldType, IncludeOptions, IndexDefinition, MemoryBackend, ModelRegistry,
    QueryOptions, Record, SortKey, StoreConfig, TableSchema,
};
use std::sync::Arc;

fn registry() -> ModelRegistry {
    ModelRegistry::new(Arc::new(MemoryBackend::new()), StoreConfig::default())
}

#[tokio::test]
async fn test_models_share_state() -> Result<()> {
    let registry = registry();
    let first = registry.define_model("users", vec![IndexDefinition::new("email_idx", ["email"]).unique()])?;
    let second = registry.define_model("users", Vec::new())?;

    first.create(Record::new().with("email", "a@x.io")).await?;
    let err = second
        .create(Record::new().with("email", "a@x.io"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::IndexViolation { .. }));

    let looked_up = registry.model("users")?;
    assert!(Arc::ptr_eq(&first, &looked_up));
    assert!(matches!(registry.model("ghosts"), Err(Error::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_include_attaches_related_records() -> Result<()> {
    let registry = registry();
    let users = registry.define_model("users", Vec::new())?;
    let notes = registry.define_model("notes", vec![IndexDefinition::new("creator_idx", ["creator"])])?;

    let alice = users.create(Record::new().with("name", "alice")).await?;
    let bob = users.create(Record::new().with("name", "bob")).await?;
    let alice_id = alice.get("id").cloned().unwrap();
    notes
        .create(Record::new().with("title", "one").with("creator", alice_id.clone()))
        .await?;
    notes
        .create(Record::new().with("title", "two").with("creator", alice_id))
        .await?;

    let options = QueryOptions::new()
        .order_by(SortKey::asc("name"))
        .include(IncludeOptions::new("notes", "creator").as_field("authored"));
    let results = users.find_all(&options).await?;
    assert_eq!(results.len(), 2);

    let authored = |record: &Record| {
        record
            .get("authored")
            .and_then(Datum::as_array)
            .map(|notes| notes.len())
    };
    assert_eq!(results[0].get("name"), alice.get("name"));
    assert_eq!(authored(&results[0]), Some(2));
    assert_eq!(results[1].get("name"), bob.get("name"));
    assert_eq!(authored(&results[1]), Some(0));

    // Includes are a read-time view; nothing is written back.
    let stored = users.find_by_id(alice.id().unwrap()).await?.unwrap();
    assert!(!stored.contains("authored"));
    Ok(())
}

#[tokio::test]
async fn test_include_unknown_model_fails() -> Result<()> {
    let registry = registry();
    let users = registry.define_model("users", Vec::new())?;
    users.create(Record::new().with("name", "alice")).await?;

    let options = QueryOptions::new().include(IncludeOptions::new("comments", "author"));
    let err = users.find_all(&options).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn test_schema_is_checked_on_create_and_update() -> Result<()> {
    let registry = registry();
    let schema = TableSchema::new()
        .field("title", FieldSpec::new(FieldType::String).required().not_null())
        .field("archived", FieldSpec::new(FieldType::Boolean))
        .strict();
    let notes = registry.define_model_with_schema("notes", Vec::new(), schema)?;
    assert!(notes.schema().is_some());

    let note = notes
        .create(Record::new().with("title", "groceries").with("archived", false))
        .await?;

    let missing = notes.create(Record::new().with("archived", true)).await;
    assert!(matches!(missing, Err(Error::Validation(_))));

    let unknown = notes
        .create(Record::new().with("title", "x").with("colour", "red"))
        .await;
    assert!(matches!(unknown, Err(Error::Validation(_))));

    let id = note.id().unwrap();
    let wrong_type = notes
        .update(id.clone(), Record::new().with("archived", "yes"))
        .await;
    assert!(matches!(wrong_type, Err(Error::Validation(_))));

    let nulled = notes
        .update(id.clone(), Record::new().with("title", Datum::Null))
        .await;
    assert!(matches!(nulled, Err(Error::Validation(_))));

    // Nullable fields accept null; the record is otherwise unchanged.
    let updated = notes
        .update(id, Record::new().with("archived", Datum::Null))
        .await?
        .unwrap();
    assert_eq!(updated.get("title"), Some(&Datum::from("groceries")));
    assert_eq!(updated.get("archived"), Some(&Datum::Null));
    Ok(())
}

#[tokio::test]
async fn test_tables_and_config() -> Result<()> {
    let registry = ModelRegistry::new(
        Arc::new(MemoryBackend::new()),
        StoreConfig::from_toml("index_layout = \"per_entry\"")?,
    );
    registry.define_model("users", Vec::new())?;
    registry.define_model("notes", Vec::new())?;
    assert_eq!(registry.tables(), vec!["notes", "users"]);
    assert_eq!(registry.config().index_layout, docstore::IndexLayout::PerEntry);
    Ok(())
}

#[tokio::test]
async fn test_registry_load_includes_on_plain_records() -> Result<()> {
    let registry = registry();
    let notes = registry.define_model("notes", Vec::new())?;
    notes
        .create(Record::new().with("title", "one").with("creator", "u1"))
        .await?;

    let mut records = vec![
        Record::new().with("id", "u1"),
        Record::new().with("id", "u2"),
        Record::new().with("name", "no id"),
    ];
    registry
        .load_includes(&mut records, &[IncludeOptions::new("notes", "creator")])
        .await?;

    let counts: Vec<usize> = records
        .iter()
        .map(|r| r.get("notes").and_then(Datum::as_array).map_or(0, |a| a.len()))
        .collect();
    assert_eq!(counts, vec![1, 0, 0]);
    Ok(())
}

#[tokio::test]
async fn test_find_by_id_with_includes() -> Result<()> {
    let registry = registry();
    let users = registry.define_model("users", Vec::new())?;
    let notes = registry.define_model("notes", Vec::new())?;

    let alice = users.create(Record::new().with("name", "alice")).await?;
    notes
        .create(Record::new().with("title", "one").with("creator", alice.get("id").cloned().unwrap()))
        .await?;

    let found = users
        .find_by_id_with(alice.id().unwrap(), &[IncludeOptions::new("notes", "creator")])
        .await?
        .expect("alice exists");
    let attached = found.get("notes").and_then(Datum::as_array).map(|a| a.len());
    assert_eq!(attached, Some(1));

    assert!(users
        .find_by_id_with("missing", &[IncludeOptions::new("notes", "creator")])
        .await?
        .is_none());
    Ok(())
}
