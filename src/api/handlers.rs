use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::OntologyError;
use crate::logic::OntologyService;
use crate::model::{
    Annotation, Entity, EntityData, ForkingInstruction, ForkingStats, Id, LocalisableText,
    Organisation, Repository, UserContext,
};
use crate::store::traits::Store;

pub type AppState<S> = Arc<OntologyService<S>>;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

impl From<OntologyError> for (StatusCode, Json<ErrorResponse>) {
    fn from(err: OntologyError) -> Self {
        let status = match &err {
            OntologyError::NotFound(_) => StatusCode::NOT_FOUND,
            OntologyError::Conflict(_) => StatusCode::CONFLICT,
            OntologyError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            OntologyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            OntologyError::Storage(e) => {
                log::error!("Storage failure: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ErrorResponse::new(&err.to_string())))
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            total: items.len(),
            items,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct VersionQuery {
    pub version: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct OrganisationBody {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub super_organisation_id: Option<Id>,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

pub async fn upsert_organisation<S: Store>(
    State(service): State<AppState<S>>,
    Path(org_id): Path<Id>,
    RequestJson(body): RequestJson<OrganisationBody>,
) -> ApiResult<Organisation> {
    let mut organisation = Organisation::new(org_id, body.name);
    organisation.description = body.description;
    organisation.super_organisation_id = body.super_organisation_id;
    Ok(Json(service.register_organisation(organisation).await?))
}

pub async fn upsert_repository<S: Store>(
    State(service): State<AppState<S>>,
    Path((org_id, repo_id)): Path<(Id, Id)>,
    RequestJson(body): RequestJson<RepositoryBody>,
) -> ApiResult<Repository> {
    let mut repository = Repository::new(repo_id, org_id, body.primary);
    if let Some(name) = body.name {
        repository.name = name;
    }
    repository.description = body.description;
    Ok(Json(service.register_repository(repository).await?))
}

pub async fn list_entities<S: Store>(
    State(service): State<AppState<S>>,
    Path((org_id, repo_id)): Path<(Id, Id)>,
) -> ApiResult<ListResponse<Entity>> {
    let entities = service
        .get_entities_by_repository_id(&org_id, &repo_id)
        .await?;
    Ok(Json(entities.into()))
}

pub async fn count_entities<S: Store>(
    State(service): State<AppState<S>>,
    Path((org_id, repo_id)): Path<(Id, Id)>,
) -> ApiResult<CountResponse> {
    let count = service.count_entities(&org_id, &repo_id).await?;
    Ok(Json(CountResponse { count }))
}

pub async fn list_root_entities<S: Store>(
    State(service): State<AppState<S>>,
    Path((org_id, repo_id)): Path<(Id, Id)>,
) -> ApiResult<ListResponse<Entity>> {
    let roots = service
        .get_root_entities_by_repository_id(&org_id, &repo_id)
        .await?;
    Ok(Json(roots.into()))
}

pub async fn create_entity<S: Store>(
    State(service): State<AppState<S>>,
    Path((org_id, repo_id)): Path<(Id, Id)>,
    user: UserContext,
    RequestJson(data): RequestJson<EntityData>,
) -> Result<(StatusCode, Json<Entity>), (StatusCode, Json<ErrorResponse>)> {
    let entity = service.create_entity(&org_id, &repo_id, data, &user).await?;
    Ok((StatusCode::CREATED, Json(entity)))
}

pub async fn get_entity<S: Store>(
    State(service): State<AppState<S>>,
    Path((org_id, repo_id, entity_id)): Path<(Id, Id, Id)>,
    Query(query): Query<VersionQuery>,
) -> ApiResult<Entity> {
    let entity = service
        .load_entity(&org_id, &repo_id, &entity_id, query.version)
        .await?;
    Ok(Json(entity))
}

pub async fn update_entity<S: Store>(
    State(service): State<AppState<S>>,
    Path((org_id, repo_id, entity_id)): Path<(Id, Id, Id)>,
    user: UserContext,
    RequestJson(data): RequestJson<EntityData>,
) -> ApiResult<Entity> {
    let entity = service
        .update_entity_by_id(&org_id, &repo_id, &entity_id, data, &user)
        .await?;
    Ok(Json(entity))
}

pub async fn delete_entity<S: Store>(
    State(service): State<AppState<S>>,
    Path((org_id, repo_id, entity_id)): Path<(Id, Id, Id)>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    service.delete_entity(&org_id, &repo_id, &entity_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_versions<S: Store>(
    State(service): State<AppState<S>>,
    Path((org_id, repo_id, entity_id)): Path<(Id, Id, Id)>,
) -> ApiResult<ListResponse<Entity>> {
    let versions = service.get_versions(&org_id, &repo_id, &entity_id).await?;
    Ok(Json(versions.into()))
}

pub async fn set_current_version<S: Store>(
    State(service): State<AppState<S>>,
    Path((org_id, repo_id, entity_id, version)): Path<(Id, Id, Id, i32)>,
) -> ApiResult<Entity> {
    let entity = service
        .set_current_entity_version(&org_id, &repo_id, &entity_id, version)
        .await?;
    Ok(Json(entity))
}

pub async fn hide_version<S: Store>(
    State(service): State<AppState<S>>,
    Path((org_id, repo_id, entity_id, version)): Path<(Id, Id, Id, i32)>,
) -> ApiResult<Entity> {
    let entity = service
        .hide_version(&org_id, &repo_id, &entity_id, version)
        .await?;
    Ok(Json(entity))
}

pub async fn delete_version<S: Store>(
    State(service): State<AppState<S>>,
    Path((org_id, repo_id, entity_id, version)): Path<(Id, Id, Id, i32)>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    service
        .delete_version(&org_id, &repo_id, &entity_id, version)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_annotations<S: Store>(
    State(service): State<AppState<S>>,
    Path((org_id, repo_id, entity_id, property)): Path<(Id, Id, Id, String)>,
    Query(query): Query<VersionQuery>,
) -> ApiResult<ListResponse<Annotation>> {
    let annotations = service
        .get_annotations(&org_id, &repo_id, &entity_id, query.version, &property)
        .await?;
    Ok(Json(annotations.into()))
}

pub async fn set_annotations<S: Store>(
    State(service): State<AppState<S>>,
    Path((org_id, repo_id, entity_id, version, property)): Path<(Id, Id, Id, i32, String)>,
    RequestJson(values): RequestJson<Vec<LocalisableText>>,
) -> ApiResult<ListResponse<Annotation>> {
    let annotations = service
        .set_annotations(&org_id, &repo_id, &entity_id, version, &property, values)
        .await?;
    Ok(Json(annotations.into()))
}

pub async fn delete_annotations<S: Store>(
    State(service): State<AppState<S>>,
    Path((org_id, repo_id, entity_id, version)): Path<(Id, Id, Id, i32)>,
) -> ApiResult<CountResponse> {
    let count = service
        .delete_annotations(&org_id, &repo_id, &entity_id, version)
        .await?;
    Ok(Json(CountResponse { count }))
}

pub async fn list_subclasses<S: Store>(
    State(service): State<AppState<S>>,
    Path((org_id, repo_id, entity_id)): Path<(Id, Id, Id)>,
) -> ApiResult<ListResponse<Entity>> {
    let subclasses = service
        .get_subclasses(&org_id, &repo_id, &entity_id)
        .await?;
    Ok(Json(subclasses.into()))
}

pub async fn get_forking_stats<S: Store>(
    State(service): State<AppState<S>>,
    Path((org_id, repo_id, entity_id)): Path<(Id, Id, Id)>,
) -> ApiResult<ForkingStats> {
    let stats = service
        .get_forking_stats(&org_id, &repo_id, &entity_id)
        .await?;
    Ok(Json(stats))
}

pub async fn create_fork<S: Store>(
    State(service): State<AppState<S>>,
    Path((org_id, repo_id, entity_id)): Path<(Id, Id, Id)>,
    user: UserContext,
    RequestJson(instruction): RequestJson<ForkingInstruction>,
) -> ApiResult<ListResponse<Entity>> {
    let forks = service
        .create_fork(&org_id, &repo_id, &entity_id, instruction, &user)
        .await?;
    Ok(Json(forks.into()))
}
