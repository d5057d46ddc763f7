//! Tests for the reconciler module.

#[cfg(test)]
mod tests {
    use super::super::reconciler::*;
    use crate::storage::{Document, DocumentStore, MemoryStore, Query, StoreOp};
    use crate::sync::types::{RemoteTimeEvent, TIME_EVENT_MODULE};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn event(value: Value) -> RemoteTimeEvent {
        serde_json::from_value(value).unwrap()
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn approved() -> RemoteTimeEvent {
        event(json!({
            "EmployeeID": "100",
            "EventDate": "2020-01-01",
            "EventTime": "0800",
            "StatusText": "Approved",
            "Status": "APPROVED"
        }))
    }

    fn posted(req_id: &str) -> RemoteTimeEvent {
        event(json!({
            "EmployeeID": "100",
            "EventDate": "2020-01-01",
            "EventTime": "0800",
            "StatusText": "Posted",
            "Status": "POSTED",
            "ReqId": req_id
        }))
    }

    fn setup(docs: Vec<Document>) -> (Arc<MemoryStore>, SyncReconciler<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_documents(docs));
        let reconciler = SyncReconciler::new(store.clone());
        (store, reconciler)
    }

    fn cached(store: &MemoryStore) -> Vec<Document> {
        store
            .documents()
            .into_iter()
            .filter(|d| d["module"] == TIME_EVENT_MODULE)
            .collect()
    }

    #[tokio::test]
    async fn approved_event_is_cached_once() {
        let (store, reconciler) = setup(vec![]);

        let summary = reconciler.reconcile(&[approved()]).await;
        assert_eq!(summary.inserted, 1);

        let docs = cached(&store);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["isSynced"], true);
        assert_eq!(docs[0]["isPosted"], false);
        assert_eq!(docs[0]["EmployeeID"], "100");
        assert_eq!(docs[0]["EventDate"], "2020-01-01");
        assert_eq!(docs[0]["EventTime"], "0800");
        assert_eq!(docs[0]["StatusText"], "Approved");
        assert!(docs[0].get("ReqId").is_none());
    }

    #[tokio::test]
    async fn approved_event_is_not_mutated_again() {
        let (store, reconciler) = setup(vec![]);
        reconciler.reconcile(&[approved()]).await;
        let before = store.documents();

        let mut changed = approved();
        changed.status = Some("SOMETHING_ELSE".into());
        let summary = reconciler.reconcile(&[changed]).await;

        assert_eq!(summary.inserted, 0);
        assert_eq!(store.documents(), before);
    }

    #[tokio::test]
    async fn posted_event_promotes_existing_record() {
        let (store, reconciler) = setup(vec![]);
        reconciler.reconcile(&[approved()]).await;

        let summary = reconciler.reconcile(&[posted("R1")]).await;
        assert_eq!(summary.posted, 1);

        let docs = cached(&store);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["isPosted"], true);
        assert_eq!(docs[0]["StatusText"], "Posted");
        assert_eq!(docs[0]["Status"], "POSTED");
        assert_eq!(docs[0]["ReqId"], "R1");
        assert_eq!(docs[0]["EmployeeID"], "100");
        assert_eq!(docs[0]["EventDate"], "2020-01-01");
        assert_eq!(docs[0]["EventTime"], "0800");
    }

    #[tokio::test]
    async fn posted_event_without_local_copy_is_inserted_posted() {
        let (store, reconciler) = setup(vec![]);
        let summary = reconciler.reconcile(&[posted("R1")]).await;
        assert_eq!(summary.inserted, 1);

        let docs = cached(&store);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["isSynced"], true);
        assert_eq!(docs[0]["isPosted"], true);
    }

    #[tokio::test]
    async fn already_posted_record_is_left_alone() {
        let (store, reconciler) = setup(vec![doc(json!({
            "module": TIME_EVENT_MODULE,
            "EmployeeID": "100",
            "EventDate": "2020-01-01",
            "EventTime": "0800",
            "StatusText": "Posted",
            "Status": "OLD",
            "ReqId": "R1",
            "isSynced": true,
            "isPosted": true
        }))]);

        let mut newer = posted("R1");
        newer.status = Some("NEW".into());
        let summary = reconciler.reconcile(&[newer]).await;

        assert_eq!(summary.posted, 0);
        assert_eq!(cached(&store)[0]["Status"], "OLD");
    }

    #[tokio::test]
    async fn approved_after_posted_never_resets_flag() {
        let (store, reconciler) = setup(vec![]);
        reconciler.reconcile(&[posted("R1")]).await;

        let mut late = approved();
        late.req_id = Some("R1".into());
        reconciler.reconcile(&[late]).await;

        let docs = cached(&store);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["isPosted"], true);
    }

    #[tokio::test]
    async fn empty_batch_prunes_posted_records() {
        let (store, reconciler) = setup(vec![]);
        reconciler.reconcile(&[posted("R1")]).await;
        assert_eq!(cached(&store).len(), 1);

        let summary = reconciler.reconcile(&[]).await;
        assert_eq!(summary.deleted, 1);
        assert!(cached(&store).is_empty());
    }

    #[tokio::test]
    async fn approved_records_survive_pruning() {
        let (store, reconciler) = setup(vec![]);
        let mut with_id = approved();
        with_id.req_id = Some("R9".into());
        reconciler.reconcile(&[with_id]).await;

        let summary = reconciler.reconcile(&[]).await;
        assert_eq!(summary.deleted, 0);
        assert_eq!(cached(&store).len(), 1);
    }

    #[tokio::test]
    async fn posted_records_without_req_id_are_never_pruned() {
        let (store, reconciler) = setup(vec![doc(json!({
            "module": TIME_EVENT_MODULE,
            "EmployeeID": "100",
            "EventDate": "2020-01-02",
            "EventTime": "0900",
            "StatusText": "Posted",
            "isSynced": true,
            "isPosted": true
        }))]);

        let summary = reconciler.reconcile(&[]).await;
        assert_eq!(summary.deleted, 0);
        assert_eq!(cached(&store).len(), 1);
    }

    #[tokio::test]
    async fn only_req_ids_missing_from_batch_are_pruned() {
        let (store, reconciler) = setup(vec![]);
        let mut second = posted("R2");
        second.event_time = Some("1700".into());
        reconciler.reconcile(&[posted("R1"), second]).await;

        let summary = reconciler.reconcile(&[posted("R1")]).await;
        assert_eq!(summary.deleted, 1);

        let docs = cached(&store);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["ReqId"], "R1");
    }

    #[tokio::test]
    async fn modified_event_overlays_existing_fields() {
        let (store, reconciler) = setup(vec![doc(json!({
            "module": TIME_EVENT_MODULE,
            "ReqId": "R2",
            "Status": "Y",
            "EventDate": "2020-01-01",
            "isSynced": true,
            "isPosted": false
        }))]);

        let remote = event(json!({"ReqId": "R2", "Origin": "M", "Status": "X", "EmployeeID": "100"}));
        let summary = reconciler.reconcile(&[remote]).await;
        assert_eq!(summary.merged, 1);

        let docs = cached(&store);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["Status"], "X");
        assert_eq!(docs[0]["EmployeeID"], "100");
        assert_eq!(docs[0]["EventDate"], "2020-01-01");
        assert_eq!(docs[0]["Origin"], "M");
        assert_eq!(docs[0]["module"], TIME_EVENT_MODULE);
    }

    #[tokio::test]
    async fn modified_event_without_match_changes_nothing() {
        let (store, reconciler) = setup(vec![]);
        let remote = event(json!({"ReqId": "R3", "Origin": "M", "Status": "X"}));
        let summary = reconciler.reconcile(&[remote]).await;
        assert_eq!(summary.merged, 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn modified_posted_event_applies_both_steps() {
        let (store, reconciler) = setup(vec![]);
        reconciler.reconcile(&[approved()]).await;

        let mut remote = posted("R1");
        remote.origin = Some("M".into());
        remote.extra.insert("Note".into(), json!("corrected"));
        let summary = reconciler.reconcile(&[remote]).await;

        assert_eq!(summary.posted, 1);
        assert_eq!(summary.merged, 1);
        let docs = cached(&store);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["isPosted"], true);
        assert_eq!(docs[0]["Note"], "corrected");
    }

    #[tokio::test]
    async fn duplicate_keys_in_one_batch_yield_one_record() {
        let (store, reconciler) = setup(vec![]);
        reconciler.reconcile(&[approved(), approved()]).await;
        assert_eq!(cached(&store).len(), 1);
    }

    #[tokio::test]
    async fn records_without_full_key_are_skipped() {
        let (store, reconciler) = setup(vec![]);
        let partial = event(json!({"EmployeeID": "100", "StatusText": "Approved"}));
        let summary = reconciler.reconcile(&[partial]).await;
        assert_eq!(summary.skipped, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn other_statuses_are_ignored() {
        let (store, reconciler) = setup(vec![]);
        let mut pending = approved();
        pending.status_text = Some("Sent for Approval".into());
        reconciler.reconcile(&[pending]).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn store_failure_skips_only_that_record() {
        let (store, reconciler) = setup(vec![]);
        store.fail_next(StoreOp::Insert);

        let mut second = approved();
        second.event_time = Some("1700".into());
        let summary = reconciler.reconcile(&[approved(), second]).await;

        assert_eq!(summary.failures, 1);
        assert_eq!(summary.inserted, 1);
        let docs = cached(&store);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["EventTime"], "1700");
    }

    #[tokio::test]
    async fn prune_failure_is_swallowed() {
        let (store, reconciler) = setup(vec![]);
        reconciler.reconcile(&[posted("R1")]).await;

        store.fail_next(StoreOp::Find);
        let summary = reconciler.reconcile(&[]).await;
        assert_eq!(summary.failures, 1);
        assert_eq!(cached(&store).len(), 1);
    }

    #[tokio::test]
    async fn other_modules_are_untouched() {
        let (store, reconciler) = setup(vec![doc(json!({
            "module": "SomethingElse",
            "StatusText": "Posted",
            "ReqId": "R1"
        }))]);
        reconciler.reconcile(&[]).await;
        let other = store
            .find(&Query::module("SomethingElse"))
            .await
            .unwrap();
        assert_eq!(other.len(), 1);
    }

    #[tokio::test]
    async fn feed_cannot_override_local_flags_on_insert() {
        let (store, reconciler) = setup(vec![]);
        let mut remote = posted("R1");
        remote.extra.insert("isPosted".into(), json!(false));
        remote.extra.insert("isSynced".into(), json!(false));
        remote.extra.insert("module".into(), json!("X"));
        remote.extra.insert("_id".into(), json!("feed-id"));

        let summary = reconciler.reconcile(&[remote]).await;
        assert_eq!(summary.inserted, 1);

        let docs = cached(&store);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["isPosted"], true);
        assert_eq!(docs[0]["isSynced"], true);
        assert_ne!(docs[0]["_id"], "feed-id");
        assert!(store.find(&Query::module("X")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn modified_event_cannot_reset_posted_flag() {
        let (store, reconciler) = setup(vec![]);
        reconciler.reconcile(&[posted("R1")]).await;
        let id = cached(&store)[0]["_id"].clone();

        let mut remote = posted("R1");
        remote.origin = Some("M".into());
        remote.status = Some("CORRECTED".into());
        remote.extra.insert("isPosted".into(), json!(false));
        remote.extra.insert("module".into(), json!("X"));
        remote.extra.insert("_id".into(), json!("feed-id"));
        let summary = reconciler.reconcile(&[remote]).await;
        assert_eq!(summary.merged, 1);

        let docs = cached(&store);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["Status"], "CORRECTED");
        assert_eq!(docs[0]["isPosted"], true);
        assert_eq!(docs[0]["module"], TIME_EVENT_MODULE);
        assert_eq!(docs[0]["_id"], id);
    }
}
