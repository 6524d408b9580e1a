use axum::{extract::State, Json};
use warden_core::AppState;
use warden_db::users;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::routes::auth::UserView;

pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UserView>, ApiError> {
    let user = users::get_user_by_id(&state.db, &auth.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(UserView::from(&user)))
}
