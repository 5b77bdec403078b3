use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;

use crate::authtoken::AuthToken;
use crate::models::{MedicationSchedule, ReminderSchedule};
use crate::store::{DocumentName, DueMedication, ReminderStore, StoreError};
use crate::util::VAR_PROJECT_ID;

const FIRESTORE_HOST: &str = "https://firestore.googleapis.com/v1";

/// Per-user sub-collection holding medication entries. The due query runs as
/// a collection group query and needs the single-field index
/// `medical_meds` / `schedule.time` ASC.
const MEDS_COLLECTION: &str = "medical_meds";

/// Per-user sub-collection of push addresses; the document id doubles as the
/// FCM registration token.
const TOKENS_COLLECTION: &str = "fcmTokens";

const TIME_FIELD: &str = "schedule.time";

pub struct FirestoreClient {
    project_id: String,
    auth_token: Arc<RwLock<AuthToken>>,
    http: reqwest::Client,
}

impl FirestoreClient {
    pub fn new(auth_token: Arc<RwLock<AuthToken>>) -> FirestoreClient {
        FirestoreClient {
            project_id: env::var(VAR_PROJECT_ID).unwrap(),
            auth_token,
            http: reqwest::Client::new(),
        }
    }

    fn documents_root(&self) -> String {
        format!(
            "{FIRESTORE_HOST}/projects/{}/databases/(default)/documents",
            self.project_id
        )
    }

    async fn bearer(&self) -> String {
        self.auth_token.read().await.token.clone()
    }
}

#[async_trait]
impl ReminderStore for FirestoreClient {
    async fn due_medications(&self, time: &str) -> Result<Vec<DueMedication>, StoreError> {
        let url = format!("{}:runQuery", self.documents_root());
        let response = self.http.post(url)
            .bearer_auth(self.bearer().await)
            .json(&run_query_body(time))
            .send()
            .await
            .map_err(StoreError::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status(status, body));
        }

        let rows: Vec<QueryRow> = response.json().await.map_err(StoreError::Http)?;
        Ok(parse_due_medications(rows))
    }

    async fn device_tokens(&self, uid: &str) -> Result<Vec<String>, StoreError> {
        let url = format!("{}/users/{uid}/{TOKENS_COLLECTION}", self.documents_root());
        let mut tokens = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.http.get(&url).bearer_auth(self.bearer().await);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }
            let response = request.send().await.map_err(StoreError::Http)?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(StoreError::Status(status, body));
            }

            let page: TokenPage = response.json().await.map_err(StoreError::Http)?;
            tokens.extend(collect_token_ids(&page));
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(tokens)
    }
}

fn run_query_body(time: &str) -> serde_json::Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": MEDS_COLLECTION, "allDescendants": true }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": TIME_FIELD },
                    "op": "EQUAL",
                    "value": { "stringValue": time },
                }
            }
        }
    })
}

// runQuery streams one row per document plus cursor-only rows carrying just a
// readTime; the latter have no `document` and are passed over.
#[derive(Deserialize, Debug)]
struct QueryRow {
    document: Option<FsDocument>,
}

#[derive(Deserialize, Debug)]
struct FsDocument {
    name: String,
    #[serde(default)]
    fields: HashMap<String, FsValue>,
}

/// The slice of Firestore's value union this pipeline reads.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
struct FsValue {
    string_value: Option<String>,
    map_value: Option<FsMapValue>,
    array_value: Option<FsArrayValue>,
}

#[derive(Deserialize, Clone, Debug)]
struct FsMapValue {
    #[serde(default)]
    fields: HashMap<String, FsValue>,
}

#[derive(Deserialize, Clone, Debug)]
struct FsArrayValue {
    #[serde(default)]
    values: Vec<FsValue>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TokenPage {
    #[serde(default)]
    documents: Vec<FsDocument>,
    next_page_token: Option<String>,
}

fn parse_due_medications(rows: Vec<QueryRow>) -> Vec<DueMedication> {
    let mut due = Vec::new();
    for row in rows {
        if let Some(doc) = row.document {
            match parse_medication(&doc) {
                Some(med) => due.push(DueMedication { doc: DocumentName::new(doc.name), med }),
                None => warn!("Skipping malformed medication doc {}", doc.name),
            }
        }
    }
    due
}

fn parse_medication(doc: &FsDocument) -> Option<MedicationSchedule> {
    let name = doc.fields.get("name")?.string_value.clone()?;
    let dosage = doc.fields.get("dosage")?.string_value.clone()?;
    let schedule = doc.fields.get("schedule")?.map_value.as_ref()?;
    let time = schedule.fields.get("time")?.string_value.clone()?;
    let days = schedule.fields.get("days")
        .and_then(|value| value.array_value.as_ref())
        .map(|array| array.values.iter().filter_map(|v| v.string_value.clone()).collect())
        .unwrap_or_default();
    Some(MedicationSchedule { name, dosage, schedule: ReminderSchedule { time, days } })
}

fn collect_token_ids(page: &TokenPage) -> Vec<String> {
    page.documents
        .iter()
        .map(|doc| DocumentName::new(doc.name.as_str()).id().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY_RESPONSE: &str = r#"[
        {
            "document": {
                "name": "projects/demo/databases/(default)/documents/users/u-1/medical_meds/m-1",
                "fields": {
                    "name": { "stringValue": "Aspiryna" },
                    "dosage": { "stringValue": "1 tabletka" },
                    "schedule": { "mapValue": { "fields": {
                        "time": { "stringValue": "08:00" },
                        "days": { "arrayValue": { "values": [
                            { "stringValue": "Codziennie" }
                        ] } }
                    } } }
                },
                "createTime": "2026-01-02T10:00:00.000000Z",
                "updateTime": "2026-01-02T10:00:00.000000Z"
            },
            "readTime": "2026-01-12T07:00:00.000000Z"
        },
        {
            "document": {
                "name": "projects/demo/databases/(default)/documents/users/u-2/medical_meds/m-2",
                "fields": {
                    "name": { "stringValue": "Metformina" }
                }
            }
        },
        { "readTime": "2026-01-12T07:00:00.000001Z" }
    ]"#;

    #[test]
    fn parses_well_formed_docs_and_drops_the_rest() {
        let rows: Vec<QueryRow> = serde_json::from_str(QUERY_RESPONSE).unwrap();
        let due = parse_due_medications(rows);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].med.name, "Aspiryna");
        assert_eq!(due[0].med.dosage, "1 tabletka");
        assert_eq!(due[0].med.schedule.time, "08:00");
        assert_eq!(due[0].med.schedule.days, vec![String::from("Codziennie")]);
        assert_eq!(due[0].doc.parent_document().unwrap().id(), "u-1");
    }

    #[test]
    fn missing_days_defaults_to_empty() {
        let row = r#"[{ "document": {
            "name": "projects/demo/databases/(default)/documents/users/u-1/medical_meds/m-4",
            "fields": {
                "name": { "stringValue": "Witamina D" },
                "dosage": { "stringValue": "2 krople" },
                "schedule": { "mapValue": { "fields": {
                    "time": { "stringValue": "21:15" }
                } } }
            }
        } }]"#;
        let rows: Vec<QueryRow> = serde_json::from_str(row).unwrap();
        let due = parse_due_medications(rows);
        assert_eq!(due.len(), 1);
        assert!(due[0].med.schedule.days.is_empty());
    }

    #[test]
    fn token_page_yields_document_ids() {
        let page: TokenPage = serde_json::from_str(r#"{
            "documents": [
                { "name": "projects/demo/databases/(default)/documents/users/u-1/fcmTokens/tok-a" },
                { "name": "projects/demo/databases/(default)/documents/users/u-1/fcmTokens/tok-b" }
            ],
            "nextPageToken": "cursor-1"
        }"#).unwrap();
        assert_eq!(collect_token_ids(&page), vec![String::from("tok-a"), String::from("tok-b")]);
        assert_eq!(page.next_page_token.as_deref(), Some("cursor-1"));
    }

    #[test]
    fn empty_token_page_is_fine() {
        let page: TokenPage = serde_json::from_str("{}").unwrap();
        assert!(collect_token_ids(&page).is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn query_filters_on_the_exact_time_string() {
        let body = run_query_body("08:00");
        let filter = &body["structuredQuery"]["where"]["fieldFilter"];
        assert_eq!(filter["field"]["fieldPath"], "schedule.time");
        assert_eq!(filter["op"], "EQUAL");
        assert_eq!(filter["value"]["stringValue"], "08:00");
        assert_eq!(body["structuredQuery"]["from"][0]["allDescendants"], true);
    }
}
