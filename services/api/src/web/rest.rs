//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::{AppState, AuthContext};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use collection_core::{
    categories::CategoryList,
    domain::{Category, ConfirmPrompt},
    ports::Confirmer,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_categories_handler,
        create_category_handler,
        delete_category_handler,
    ),
    components(
        schemas(CategoryResponse, CreateCategoryRequest)
    ),
    tags(
        (name = "Collection API", description = "API endpoints for the personal collection catalog.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct CategoryResponse {
    id: Uuid,
    name: String,
}

impl From<Category> for CategoryResponse {
    fn from(category: Category) -> Self {
        Self {
            id: category.id,
            name: category.name,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateCategoryRequest {
    name: String,
}

/// REST clients ask the user before sending a destructive request, so the
/// request itself is the approval.
struct ApprovedByRequest;

#[async_trait::async_trait]
impl Confirmer for ApprovedByRequest {
    async fn confirm(&self, _prompt: ConfirmPrompt) -> bool {
        true
    }
}

fn category_list(app_state: &AppState, auth: &AuthContext) -> CategoryList {
    CategoryList::new(
        Arc::new(app_state.db.for_user(auth.user_id)),
        Arc::new(ApprovedByRequest),
    )
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List the caller's categories, sorted by name.
#[utoipa::path(
    get,
    path = "/categories",
    responses(
        (status = 200, description = "Categories of the authenticated user", body = [CategoryResponse]),
        (status = 401, description = "Missing or invalid access token"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_categories_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match category_list(&app_state, &auth).reload().await {
        Ok(categories) => {
            let body: Vec<CategoryResponse> =
                categories.into_iter().map(CategoryResponse::from).collect();
            Ok(Json(body))
        }
        Err(e) => {
            error!("Failed to list categories: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// Create a category. The name is trimmed and must not be blank.
#[utoipa::path(
    post,
    path = "/categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = CategoryResponse),
        (status = 400, description = "Blank category name"),
        (status = 401, description = "Missing or invalid access token"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_category_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match category_list(&app_state, &auth).create(&payload.name).await {
        Ok(Some(category)) => Ok((StatusCode::CREATED, Json(CategoryResponse::from(category)))),
        Ok(None) => Err((
            StatusCode::BAD_REQUEST,
            "Category name must not be empty".to_string(),
        )),
        Err(e) => {
            error!("Failed to create category: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// Delete a category. Items stay in place; only their link to it is removed.
#[utoipa::path(
    delete,
    path = "/categories/{id}",
    params(
        ("id" = Uuid, Path, description = "The category to delete.")
    ),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 401, description = "Missing or invalid access token"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn delete_category_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    match category_list(&app_state, &auth).delete(id).await {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            error!("Failed to delete category: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
