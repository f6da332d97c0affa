mod common;

use async_trait::async_trait;
use atlas_core::{
    AppError, AppState, Columns, ConfigError, ConfigRepository, ConfigStore, ConnectionRegistry, CrudService,
    ModelService, Query, QueryOptions, Record, SortOrder,
};
use common::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

async fn seed_widgets(service: &CrudService<Widget>, names: &[&str]) -> Vec<Record<Widget>> {
    let mut out = Vec::new();
    for name in names {
        out.push(service.create(object(json!({ "name": name }))).await.unwrap());
    }
    out
}

fn names(records: &[Record<Widget>]) -> Vec<&str> {
    records.iter().filter_map(|r| r.get_str("name")).collect()
}

#[tokio::test]
async fn test_create_persists_with_timestamps() {
    let service = CrudService::<Widget>::new(state().await);

    let widget = service.create(object(json!({ "name": "alpha" }))).await.unwrap();

    assert!(widget.exists());
    assert_eq!(widget.key(), Some(&json!(1)));
    assert_eq!(widget.get_str("name"), Some("alpha"));
    assert!(widget.get_str("created_at").is_some());
    assert_eq!(widget.get("created_at"), widget.get("updated_at"));
    assert!(widget.dirty().is_empty());
}

#[tokio::test]
async fn test_list_applies_filter_callback() {
    let service = CrudService::<Widget>::new(state().await);
    seed_widgets(&service, &["alpha", "bravo"]).await;

    let options = QueryOptions::new().filter(|q| {
        q.where_eq("name", "alpha");
    });
    let widgets = service.list(&Columns::All, &options).await.unwrap();

    assert_eq!(names(&widgets), vec!["alpha"]);
}

#[tokio::test]
async fn test_list_selects_requested_columns() {
    let service = CrudService::<Widget>::new(state().await);
    seed_widgets(&service, &["alpha"]).await;

    let widgets = service
        .list(&Columns::only(["id", "name"]), &QueryOptions::new())
        .await
        .unwrap();

    assert_eq!(widgets.len(), 1);
    assert_eq!(widgets[0].attributes().len(), 2);
    assert!(widgets[0].get("created_at").is_none());
}

#[tokio::test]
async fn test_paginated_sort_descending() {
    let service = CrudService::<Widget>::new(state().await);
    seed_widgets(&service, &["alpha", "bravo"]).await;

    let page = service
        .list_paginated(1, &QueryOptions::new().sort_by("name", SortOrder::Desc))
        .await
        .unwrap();

    assert_eq!(page.total, 2);
    assert_eq!(page.last_page, 2);
    assert_eq!(names(&page.items), vec!["bravo"]);

    let second = service
        .list_paginated(1, &QueryOptions::new().sort_by("name", SortOrder::Desc).page(2))
        .await
        .unwrap();
    assert_eq!(names(&second.items), vec!["alpha"]);
}

#[tokio::test]
async fn test_paginated_sort_order_from_params() {
    let service = CrudService::<Widget>::new(state().await);
    seed_widgets(&service, &["bravo", "alpha"]).await;

    let params: HashMap<String, String> = [("sortField", "name"), ("sortOrder", "1")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let page = service
        .list_paginated(10, &QueryOptions::from_params(&params))
        .await
        .unwrap();

    assert_eq!(names(&page.items), vec!["alpha", "bravo"]);
}

#[tokio::test]
async fn test_paginated_page_past_the_end_is_empty() {
    let service = CrudService::<Widget>::new(state().await);
    seed_widgets(&service, &["alpha", "bravo"]).await;

    for (per_page, page) in [(15, u64::MAX / 2), (2, u64::MAX / 2), (1, 3), (u64::MAX, 2)] {
        let result = service
            .list_paginated(per_page, &QueryOptions::new().page(page))
            .await
            .unwrap();
        assert!(result.items.is_empty(), "per_page={per_page} page={page}");
        assert_eq!(result.total, 2);
        assert_eq!(result.current_page, page);
    }
}

#[tokio::test]
async fn test_paginated_huge_page_size_returns_everything() {
    let service = CrudService::<Widget>::new(state().await);
    seed_widgets(&service, &["alpha", "bravo"]).await;

    let page = service.list_paginated(u64::MAX, &QueryOptions::new()).await.unwrap();

    assert_eq!(names(&page.items), vec!["alpha", "bravo"]);
    assert_eq!(page.last_page, 1);
}

#[tokio::test]
async fn test_paginated_rejects_zero_page_size() {
    let service = CrudService::<Widget>::new(state().await);

    let err = service.list_paginated(0, &QueryOptions::new()).await.unwrap_err();

    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_update_persists_dirty_attributes() {
    let service = CrudService::<Widget>::new(state().await);
    let widget = seed_widgets(&service, &["alpha"]).await.remove(0);
    let id = widget.key().cloned().unwrap();

    let updated = service
        .update(widget, object(json!({ "name": "renamed" })))
        .await
        .unwrap();
    assert_eq!(updated.get_str("name"), Some("renamed"));
    assert!(updated.dirty().is_empty());

    let reloaded = service.find_or_fail(&id).await.unwrap();
    assert_eq!(reloaded.get_str("name"), Some("renamed"));
}

#[tokio::test]
async fn test_update_of_unpersisted_record_is_a_noop() {
    let state = state().await;
    let service = CrudService::<Widget>::new(state.clone());
    let draft = Record::<Widget>::new(&state.config, object(json!({ "name": "draft" }))).unwrap();

    let result = service.update(draft, object(json!({ "name": "changed" }))).await.unwrap();

    assert!(!result.exists());
    assert_eq!(result.get_str("name"), Some("draft"));
    assert_eq!(count_rows(state.connections.default_pool(), "atlas_widgets").await, 0);
}

#[tokio::test]
async fn test_update_by_key_missing_is_not_found() {
    let state = state().await;
    let service = CrudService::<Widget>::new(state.clone());
    seed_widgets(&service, &["alpha"]).await;

    let err = service
        .update_by_key(&json!(999), object(json!({ "name": "ghost" })))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    let all = service.list(&Columns::All, &QueryOptions::new()).await.unwrap();
    assert_eq!(names(&all), vec!["alpha"]);
}

#[tokio::test]
async fn test_update_cannot_retarget_another_row() {
    let state = state().await;
    let service = CrudService::<Widget>::new(state.clone());
    seed_widgets(&service, &["alpha", "bravo"]).await;

    let err = service
        .update_by_key(&json!(1), object(json!({ "id": 2, "name": "renamed" })))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::BadRequest(_)));
    let all = service.list(&Columns::All, &QueryOptions::new()).await.unwrap();
    assert_eq!(names(&all), vec!["alpha", "bravo"]);
}

#[tokio::test]
async fn test_update_accepts_unchanged_key_in_payload() {
    let service = CrudService::<Widget>::new(state().await);
    seed_widgets(&service, &["alpha", "bravo"]).await;

    let updated = service
        .update_by_key(&json!(1), object(json!({ "id": 1, "name": "renamed" })))
        .await
        .unwrap();

    assert_eq!(updated.key(), Some(&json!(1)));
    let all = service.list(&Columns::All, &QueryOptions::new()).await.unwrap();
    assert_eq!(names(&all), vec!["renamed", "bravo"]);
}

#[tokio::test]
async fn test_delete_uses_loaded_key() {
    let service = CrudService::<Widget>::new(state().await);
    let mut widget = seed_widgets(&service, &["alpha", "bravo"]).await.remove(0);
    widget.set("id", 2);

    assert!(service.delete(&mut widget, false).await.unwrap());

    assert!(service.find(&json!(1)).await.unwrap().is_none());
    assert_eq!(service.find_or_fail(&json!(2)).await.unwrap().get_str("name"), Some("bravo"));
}

#[tokio::test]
async fn test_update_by_key() {
    let service = CrudService::<Widget>::new(state().await);
    seed_widgets(&service, &["alpha"]).await;

    let updated = service
        .update_by_key(&json!(1), object(json!({ "name": "bravo" })))
        .await
        .unwrap();

    assert_eq!(updated.get_str("name"), Some("bravo"));
}

#[tokio::test]
async fn test_delete_removes_row() {
    let service = CrudService::<Widget>::new(state().await);
    let mut widget = seed_widgets(&service, &["alpha"]).await.remove(0);
    let id = widget.key().cloned().unwrap();

    assert!(service.delete(&mut widget, false).await.unwrap());
    assert!(!widget.exists());
    assert!(service.find(&id).await.unwrap().is_none());
    assert!(!service.delete(&mut widget, false).await.unwrap());
}

#[tokio::test]
async fn test_soft_delete_then_force_delete() {
    let state = state().await;
    let service = CrudService::<Note>::new(state.clone());
    let mut note = service.create(object(json!({ "body": "hello" }))).await.unwrap();
    let id = note.key().cloned().unwrap();
    assert_eq!(id.as_str().map(str::len), Some(36));

    assert!(service.delete(&mut note, false).await.unwrap());
    assert!(note.get_str("deleted_at").is_some());
    assert!(service.find(&id).await.unwrap().is_none());

    let trashed = service
        .list(
            &Columns::All,
            &QueryOptions::new().filter(|q| {
                q.with_trashed();
            }),
        )
        .await
        .unwrap();
    assert_eq!(trashed.len(), 1);

    assert!(service.delete(&mut note, true).await.unwrap());
    assert_eq!(count_rows(state.connections.default_pool(), "atlas_notes").await, 0);
}

#[tokio::test]
async fn test_eager_loads_and_counts() {
    let state = state().await;
    let widgets = CrudService::<Widget>::new(state.clone());
    let gadgets = CrudService::<Gadget>::new(state.clone());
    seed_widgets(&widgets, &["alpha", "bravo"]).await;
    for label in ["left", "right"] {
        gadgets
            .create(object(json!({ "widget_id": 1, "label": label })))
            .await
            .unwrap();
    }

    let options = QueryOptions::new().with("gadgets").with_count("gadgets");
    let listed = widgets.list(&Columns::All, &options).await.unwrap();

    let alpha = &listed[0];
    assert_eq!(alpha.relation("gadgets").and_then(Value::as_array).map(Vec::len), Some(2));
    assert_eq!(alpha.get_i64("gadgets_count"), Some(2));
    assert!(alpha.dirty().is_empty());
    let bravo = &listed[1];
    assert_eq!(bravo.relation("gadgets"), Some(&json!([])));
    assert_eq!(bravo.get_i64("gadgets_count"), Some(0));

    let with_owner = gadgets
        .list(&Columns::All, &QueryOptions::new().with("widget"))
        .await
        .unwrap();
    assert_eq!(
        with_owner[0].relation("widget").and_then(|w| w.get("name")),
        Some(&json!("alpha"))
    );
    let json = with_owner[0].to_json();
    assert_eq!(json["widget"]["id"], json!(1));
}

#[tokio::test]
async fn test_unknown_relation_fails() {
    let service = CrudService::<Widget>::new(state().await);

    let err = service
        .list(&Columns::All, &QueryOptions::new().with("owners"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::RelationNotFound { relation, .. } if relation == "owners"));
}

#[tokio::test]
async fn test_unconfigured_service_fails_before_data_access() {
    // No atlas_keyless table exists; the capability check must fire first.
    let service = CrudService::<Keyless>::new(state().await);

    let err = service.list(&Columns::All, &QueryOptions::new()).await.unwrap_err();
    assert!(matches!(err, AppError::Config(ConfigError::UnconfiguredService { .. })));

    let err = service.create(object(json!({ "name": "x" }))).await.unwrap_err();
    assert!(matches!(err, AppError::Config(ConfigError::UnconfiguredService { .. })));
}

#[tokio::test]
async fn test_configured_table_name_is_used() {
    let mut config = ConfigRepository::new();
    config.set("atlas-testing.tables.widgets", " custom_widgets ");
    let state = state_with(config).await;
    let service = CrudService::<Widget>::new(state.clone());

    let widget = service.create(object(json!({ "name": "alpha" }))).await.unwrap();

    assert_eq!(widget.table(), "custom_widgets");
    assert_eq!(count_rows(state.connections.default_pool(), "custom_widgets").await, 1);
}

#[tokio::test]
async fn test_configured_connection_routes_queries() {
    let mut config = ConfigRepository::new();
    config.set("atlas-testing.database.connection", "secondary");
    let config: Arc<dyn ConfigStore> = Arc::new(config);
    let secondary = memory_pool().await;
    create_tables(&config, &secondary).await;
    let registry = ConnectionRegistry::new(memory_pool().await).with_connection("secondary", secondary.clone());
    let service = CrudService::<Widget>::new(AppState::new(config, registry));

    let widget = service.create(object(json!({ "name": "alpha" }))).await.unwrap();

    assert_eq!(widget.connection_name(), Some("secondary"));
    assert_eq!(count_rows(&secondary, "atlas_widgets").await, 1);
    let listed = service.list(&Columns::All, &QueryOptions::new()).await.unwrap();
    assert_eq!(listed[0].connection_name(), Some("secondary"));
}

#[tokio::test]
async fn test_unknown_connection_is_an_error() {
    let mut config = ConfigRepository::new();
    config.set("atlas-testing.database.connection", "missing");
    let service = CrudService::<Widget>::new(state_with(config).await);

    let err = service.list(&Columns::All, &QueryOptions::new()).await.unwrap_err();

    assert!(matches!(err, AppError::Config(ConfigError::UnknownConnection(name)) if name == "missing"));
}

/// Service whose base query only ever sees widgets named "alpha".
struct AlphaWidgets {
    state: AppState,
}

#[async_trait]
impl ModelService for AlphaWidgets {
    type Entity = Widget;

    fn state(&self) -> &AppState {
        &self.state
    }

    fn build_query(&self, _options: &QueryOptions) -> Result<Query, AppError> {
        let mut query = self.query()?;
        query.where_eq("name", "alpha");
        Ok(query)
    }
}

#[tokio::test]
async fn test_build_query_override_applies_to_list_and_page() {
    let state = state().await;
    seed_widgets(&CrudService::<Widget>::new(state.clone()), &["alpha", "bravo", "alpha"]).await;
    let service = AlphaWidgets { state };

    let listed = service.list(&Columns::All, &QueryOptions::new()).await.unwrap();
    assert_eq!(names(&listed), vec!["alpha", "alpha"]);

    let page = service.list_paginated(1, &QueryOptions::new()).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 1);
}
