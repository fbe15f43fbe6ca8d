use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use top_backend_rust::{build_app, EntityListCache, MemoryStore};

// Test client wrapper for making API calls
struct TestClient {
    client: Client,
    base_url: String,
}

impl TestClient {
    /// Serve a fresh in-memory backend on an ephemeral port.
    async fn spawn() -> Self {
        let app = build_app(Arc::new(MemoryStore::new()), EntityListCache::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            client: Client::new(),
            base_url: format!("http://{}", address),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, json: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header("x-user-id", "curator")
            .json(&json)
            .send()
            .await
            .unwrap()
    }

    async fn put(&self, path: &str, json: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .header("x-user-id", "curator")
            .json(&json)
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    async fn delete(&self, path: &str) -> reqwest::Response {
        self.client.delete(self.url(path)).send().await.unwrap()
    }
}

const PRIMARY: &str = "/organisations/uni/repositories/top";
const LOCAL: &str = "/organisations/uni/repositories/cohort";

async fn setup() -> TestClient {
    let client = TestClient::spawn().await;

    let org = client.put("/organisations/uni", json!({ "name": "University" })).await;
    assert_eq!(org.status(), StatusCode::OK);
    let primary = client
        .put(PRIMARY, json!({ "name": "TOP", "primary": true }))
        .await;
    assert_eq!(primary.status(), StatusCode::OK);
    let local = client.put(LOCAL, json!({ "name": "Cohort" })).await;
    assert_eq!(local.status(), StatusCode::OK);

    for body in [
        json!({ "id": "anthropometry", "entity_type": "category",
                "titles": [{ "text": "Anthropometry", "lang": "en" }] }),
        json!({ "id": "weight", "entity_type": "single_phenotype",
                "titles": [{ "text": "Weight", "lang": "en" }],
                "super_categories": ["anthropometry"] }),
        json!({ "id": "weight_kg", "entity_type": "restricted_phenotype",
                "titles": [{ "text": "Weight in kg", "lang": "en" }],
                "super_phenotype": "weight" }),
    ] {
        let created = client.post(&format!("{}/entities", PRIMARY), body).await;
        assert_eq!(created.status(), StatusCode::CREATED);
    }

    client
}

fn fork_instruction(cascade: bool, update: bool) -> Value {
    json!({
        "organisation_id": "uni",
        "repository_id": "cohort",
        "cascade": cascade,
        "update": update
    })
}

fn origin_ids(items: &Value) -> Vec<String> {
    let mut ids: Vec<String> = items["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["origin_id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_fork_workflow() {
    let client = setup().await;
    let fork_path = format!("{}/entities/anthropometry/fork", PRIMARY);

    // Cascading fork brings the whole subtree over
    let forked = client.post(&fork_path, fork_instruction(true, false)).await;
    assert_eq!(forked.status(), StatusCode::OK);
    let forked: Value = forked.json().await.unwrap();
    assert_eq!(
        origin_ids(&forked),
        vec!["anthropometry", "weight", "weight_kg"]
    );
    for entity in forked["items"].as_array().unwrap() {
        assert_eq!(entity["repository_id"], "cohort");
        assert_eq!(entity["version"], 1);
        assert_eq!(entity["author"], "curator");
        assert_ne!(entity["id"], entity["origin_id"]);
    }

    let count: Value = client
        .get(&format!("{}/entity-count", LOCAL))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(count["count"], 3);

    // Only the forked category is a root in the destination
    let roots: Value = client
        .get(&format!("{}/root-entities", LOCAL))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(roots["total"], 1);
    assert_eq!(roots["items"][0]["origin_id"], "anthropometry");
    let category_fork = roots["items"][0]["id"].as_str().unwrap().to_string();

    let subclasses: Value = client
        .get(&format!("{}/entities/{}/subclasses", LOCAL, category_fork))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(subclasses["total"], 1);
    assert_eq!(subclasses["items"][0]["origin_id"], "weight");

    // Forking again without update leaves existing forks alone
    let again: Value = client
        .post(&fork_path, fork_instruction(true, false))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(again["total"], 0);
    let count: Value = client
        .get(&format!("{}/entity-count", LOCAL))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(count["count"], 3);

    // Change the origin, then bring the fork up to date
    let updated = client
        .put(
            &format!("{}/entities/anthropometry", PRIMARY),
            json!({ "titles": [{ "text": "Body measures", "lang": "en" }] }),
        )
        .await;
    assert_eq!(updated.status(), StatusCode::OK);

    let refreshed: Value = client
        .post(&fork_path, fork_instruction(false, true))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(refreshed["total"], 1);
    assert_eq!(refreshed["items"][0]["id"], category_fork.as_str());
    assert_eq!(refreshed["items"][0]["version"], 2);
    assert_eq!(refreshed["items"][0]["titles"][0]["text"], "Body measures");

    // Stats from both sides of the fork
    let stats: Value = client
        .get(&fork_path)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(stats["forks"].as_array().unwrap().len(), 1);
    assert_eq!(stats["forks"][0]["repository_name"], "Cohort");

    let fork_stats: Value = client
        .get(&format!("{}/entities/{}/fork", LOCAL, category_fork))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(fork_stats["origin"]["id"], "anthropometry");
    assert_eq!(fork_stats["origin"]["titles"][0]["text"], "Body measures");
}

#[tokio::test]
async fn test_version_lifecycle() {
    let client = setup().await;
    let entity = format!("{}/entities/weight", PRIMARY);

    let second = client
        .put(
            &entity,
            json!({ "titles": [{ "text": "Body weight", "lang": "en" }] }),
        )
        .await;
    assert_eq!(second.status(), StatusCode::OK);
    let second: Value = second.json().await.unwrap();
    assert_eq!(second["version"], 2);
    // Updates without hierarchy fields keep the superclasses
    assert_eq!(second["super_categories"], json!(["anthropometry"]));

    let versions: Value = client
        .get(&format!("{}/versions", entity))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(versions["total"], 2);
    assert_eq!(versions["items"][0]["version"], 2);

    let first: Value = client
        .get(&format!("{}?version=1", entity))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(first["titles"][0]["text"], "Weight");
    assert_eq!(first["current"], false);

    let restored = client
        .post(&format!("{}/versions/1/current", entity), json!({}))
        .await;
    assert_eq!(restored.status(), StatusCode::OK);
    let restored: Value = restored.json().await.unwrap();
    assert_eq!(restored["version"], 1);

    let hidden = client
        .post(&format!("{}/versions/2/hide", entity), json!({}))
        .await;
    assert_eq!(hidden.status(), StatusCode::OK);

    let hidden_current = client
        .post(&format!("{}/versions/2/current", entity), json!({}))
        .await;
    assert_eq!(hidden_current.status(), StatusCode::NOT_ACCEPTABLE);

    let delete_current = client.delete(&format!("{}/versions/1", entity)).await;
    assert_eq!(delete_current.status(), StatusCode::CONFLICT);

    let delete_old = client.delete(&format!("{}/versions/2", entity)).await;
    assert_eq!(delete_old.status(), StatusCode::NO_CONTENT);

    let versions: Value = client
        .get(&format!("{}/versions", entity))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(versions["total"], 1);
}

#[tokio::test]
async fn test_error_codes() {
    let client = setup().await;

    // Forking within the same repository
    let same_repo = client
        .post(
            &format!("{}/entities/weight/fork", PRIMARY),
            json!({ "organisation_id": "uni", "repository_id": "top" }),
        )
        .await;
    assert_eq!(same_repo.status(), StatusCode::NOT_ACCEPTABLE);

    // Forking out of a non-primary repository
    let local = client
        .post(
            &format!("{}/entities", LOCAL),
            json!({ "id": "local_only", "entity_type": "category" }),
        )
        .await;
    assert_eq!(local.status(), StatusCode::CREATED);
    let non_primary = client
        .post(
            &format!("{}/entities/local_only/fork", LOCAL),
            json!({ "organisation_id": "uni", "repository_id": "top" }),
        )
        .await;
    assert_eq!(non_primary.status(), StatusCode::NOT_ACCEPTABLE);

    // Entity owned by another repository
    let foreign = client.get(&format!("{}/entities/weight", LOCAL)).await;
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

    let duplicate = client
        .post(
            &format!("{}/entities", PRIMARY),
            json!({ "id": "weight", "entity_type": "single_phenotype" }),
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let restricted_without_parent = client
        .post(
            &format!("{}/entities", PRIMARY),
            json!({ "id": "orphan", "entity_type": "restricted_phenotype" }),
        )
        .await;
    assert_eq!(restricted_without_parent.status(), StatusCode::BAD_REQUEST);

    let change_type = client
        .put(
            &format!("{}/entities/weight", PRIMARY),
            json!({ "entity_type": "category" }),
        )
        .await;
    assert_eq!(change_type.status(), StatusCode::CONFLICT);

    let deleted = client.delete(&format!("{}/entities/weight_kg", PRIMARY)).await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    let gone = client.get(&format!("{}/entities/weight_kg", PRIMARY)).await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}
