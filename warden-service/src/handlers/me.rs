use axum::{extract::State, Json};

use crate::dtos::{DataScopeView, MenusResponse, PermissionsResponse};
use crate::middleware::CurrentUser;
use crate::AppState;
use warden_core::error::AppError;

/// GET /users/me/permissions
pub async fn my_permissions(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> Result<Json<PermissionsResponse>, AppError> {
    let permissions = state.gate.permissions_for(&principal).await?;
    let scope = state.gate.scope(&principal).await?;

    Ok(Json(PermissionsResponse {
        username: principal.username.clone(),
        roles: principal.roles,
        permissions: (*permissions).clone(),
        data_scope: DataScopeView::from(scope),
    }))
}

/// GET /users/me/menus
pub async fn my_menus(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> Result<Json<MenusResponse>, AppError> {
    let menus = state.permissions.menu_tree_for(&principal).await?;
    let buttons = state.permissions.button_permissions_for(&principal).await?;

    Ok(Json(MenusResponse { menus, buttons }))
}
