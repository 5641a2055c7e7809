//! Kibana client tests: spaces, Fleet, saved objects, alerting and
//! detection rules.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use rustible_elastic::error::Error;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_requests_carry_xsrf_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/status"))
        .and(header("kbn-xsrf", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "version": {"number": "8.12.0"}
        })))
        .mount(&server)
        .await;

    assert_eq!(kibana(&server).version().await.unwrap(), "8.12.0");
}

#[tokio::test]
async fn test_space_prefix_applies_to_space_aware_apis() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/s/soc/api/actions/connectors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "c-1", "name": "pager", "connector_type_id": ".pagerduty"}
        ])))
        .mount(&server)
        .await;

    let kibana = kibana(&server).with_space("soc");
    assert_eq!(kibana.space(), Some("soc"));
    let connector = kibana.connector_by_name("pager").await.unwrap().unwrap();
    assert_eq!(connector["id"], "c-1");
}

#[tokio::test]
async fn test_default_space_has_no_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/actions/connectors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let kibana = kibana(&server).with_space("default");
    assert!(kibana.space().is_none());
    assert!(kibana.connectors().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_agent_policy_by_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/fleet/agent_policies"))
        .and(query_param("perPage", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "ap-1", "name": "windows-hosts", "namespace": "default"},
                {"id": "ap-2", "name": "linux-hosts", "namespace": "default"}
            ],
            "total": 2
        })))
        .mount(&server)
        .await;

    let policy = kibana(&server)
        .agent_policy_by_name("linux-hosts")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(policy["id"], "ap-2");
}

#[tokio::test]
async fn test_delete_agent_policy_posts_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/fleet/agent_policies/delete"))
        .and(body_json(json!({"agentPolicyId": "ap-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "ap-1"})))
        .expect(1)
        .mount(&server)
        .await;

    kibana(&server).delete_agent_policy("ap-1").await.unwrap();
}

#[tokio::test]
async fn test_enrollment_keys_filtered_by_policy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/fleet/enrollment_api_keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "list": [
                {"id": "k-1", "policy_id": "ap-1", "api_key": "abc"},
                {"id": "k-2", "policy_id": "ap-2", "api_key": "def"}
            ]
        })))
        .mount(&server)
        .await;

    let keys = kibana(&server).enrollment_keys("ap-1").await.unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["api_key"], "abc");
}

#[tokio::test]
async fn test_package_info_missing_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/fleet/epm/packages/nope"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = kibana(&server).package_info("nope").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn test_package_policy_by_name_scoped_to_agent_policy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/fleet/package_policies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "pp-1", "name": "endpoint", "policy_id": "ap-1"},
                {"id": "pp-2", "name": "endpoint", "policy_id": "ap-2"}
            ]
        })))
        .mount(&server)
        .await;

    let kibana = kibana(&server);
    let found = kibana
        .package_policy_by_name(Some("ap-2"), "endpoint")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found["id"], "pp-2");
    assert!(kibana
        .package_policy_by_name(Some("ap-3"), "endpoint")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_create_package_policy_unwraps_item() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/fleet/package_policies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "item": {"id": "pp-9", "name": "system-1"}
        })))
        .mount(&server)
        .await;

    let created = kibana(&server)
        .create_package_policy(&json!({"name": "system-1"}))
        .await
        .unwrap();
    assert_eq!(created["id"], "pp-9");
}

#[tokio::test]
async fn test_saved_object_by_title_requires_exact_match() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/saved_objects/_find"))
        .and(query_param("type", "dashboard"))
        .and(query_param("search_fields", "title"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "saved_objects": [
                {"id": "d-1", "type": "dashboard", "attributes": {"title": "Hosts overview"}},
                {"id": "d-2", "type": "dashboard", "attributes": {"title": "Hosts"}}
            ]
        })))
        .mount(&server)
        .await;

    let found = kibana(&server)
        .saved_object_by_title("dashboard", "Hosts")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found["id"], "d-2");
}

#[tokio::test]
async fn test_export_parses_ndjson_and_drops_summary() {
    let server = MockServer::start().await;
    let ndjson = concat!(
        "{\"id\":\"d-1\",\"type\":\"dashboard\",\"attributes\":{\"title\":\"Hosts\"}}\n",
        "{\"id\":\"v-1\",\"type\":\"visualization\",\"attributes\":{\"title\":\"CPU\"}}\n",
        "{\"exportedCount\":2,\"missingRefCount\":0}\n"
    );
    Mock::given(method("POST"))
        .and(path("/s/soc/api/saved_objects/_export"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ndjson, "application/ndjson"))
        .mount(&server)
        .await;

    let exported = kibana(&server)
        .with_space("soc")
        .export_saved_objects(&["dashboard".to_string()], &[])
        .await
        .unwrap();
    assert_eq!(exported.len(), 2);
    assert_eq!(exported[1]["type"], "visualization");
}

#[tokio::test]
async fn test_bulk_create_sends_overwrite() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/saved_objects/_bulk_create"))
        .and(query_param("overwrite", "true"))
        .and(body_json(json!([
            {"type": "dashboard", "id": "d-1", "attributes": {"title": "Hosts"}}
        ])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"saved_objects": []})))
        .expect(1)
        .mount(&server)
        .await;

    kibana(&server)
        .bulk_create_saved_objects(
            &[json!({"id": "d-1", "type": "dashboard", "attributes": {"title": "Hosts"}})],
            true,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_alert_lookup_and_enable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/alerting/rules/_find"))
        .and(query_param("search", "cpu high"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "r-0", "name": "cpu high (copy)"},
                {"id": "r-1", "name": "cpu high", "enabled": false}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/alerting/rule/r-1/_enable"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let kibana = kibana(&server);
    let alert = kibana.alert_by_name("cpu high").await.unwrap().unwrap();
    assert_eq!(alert["id"], "r-1");
    kibana.set_alert_enabled("r-1", true).await.unwrap();
}

#[tokio::test]
async fn test_update_alert_sends_only_updatable_fields() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/alerting/rule/r-1"))
        .and(body_json(json!({
            "name": "cpu high",
            "schedule": {"interval": "5m"},
            "params": {}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r-1"})))
        .expect(1)
        .mount(&server)
        .await;

    kibana(&server)
        .update_alert(
            "r-1",
            &json!({
                "name": "cpu high",
                "rule_type_id": ".index-threshold",
                "consumer": "alerts",
                "schedule": {"interval": "5m"},
                "params": {}
            }),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_connector_type_id_matches_name_or_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/actions/connector_types"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": ".email", "name": "Email"},
            {"id": ".slack", "name": "Slack"}
        ])))
        .mount(&server)
        .await;

    let kibana = kibana(&server);
    assert_eq!(
        kibana.connector_type_id("slack").await.unwrap().as_deref(),
        Some(".slack")
    );
    assert_eq!(
        kibana.connector_type_id(".email").await.unwrap().as_deref(),
        Some(".email")
    );
    assert!(kibana.connector_type_id("teams").await.unwrap().is_none());
}

#[tokio::test]
async fn test_detection_rules_follow_pagination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/detection_engine/rules/_find"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "page": 1, "total": 3,
            "data": [{"rule_id": "a"}, {"rule_id": "b"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/detection_engine/rules/_find"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "page": 2, "total": 3,
            "data": [{"rule_id": "c"}]
        })))
        .mount(&server)
        .await;

    let rules = kibana(&server).find_detection_rules(None).await.unwrap();
    let ids: Vec<_> = rules.iter().map(|r| r["rule_id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_add_detection_rule_tags_patches_only_when_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/detection_engine/rules"))
        .and(query_param("rule_id", "r-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rule_id": "r-1", "tags": ["Elastic", "Windows"]
        })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/detection_engine/rules"))
        .and(body_json(json!({"rule_id": "r-1", "tags": ["Elastic", "Windows", "SOC"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rule_id": "r-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let kibana = kibana(&server);
    assert!(!kibana
        .add_detection_rule_tags("r-1", &["Windows".to_string()])
        .await
        .unwrap());
    assert!(kibana
        .add_detection_rule_tags("r-1", &["SOC".to_string()])
        .await
        .unwrap());
}

#[tokio::test]
async fn test_missing_detection_rule_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/detection_engine/rules"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "rule_id: \"x\" not found", "status_code": 404
        })))
        .mount(&server)
        .await;

    assert!(kibana(&server).detection_rule("x").await.unwrap().is_none());
}

#[tokio::test]
async fn test_spaces_bypass_space_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/spaces/space/soc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "soc", "name": "SOC"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/spaces/space/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let kibana = kibana(&server).with_space("soc");
    assert_eq!(kibana.space_info("soc").await.unwrap().unwrap()["name"], "SOC");
    assert!(kibana.space_info("gone").await.unwrap().is_none());
}
