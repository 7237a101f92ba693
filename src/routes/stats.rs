use rocket::serde::json::Json;
use rocket::{State, get};

use crate::archive::Archive;
use crate::error::ApiError;
use crate::models::StatsSummary;
use crate::routes::params::StatsParams;
use crate::session::Viewer;

#[get("/stats?<params..>")]
pub async fn get_stats(
    params: StatsParams,
    viewer: Viewer,
    archive: &State<Archive>,
) -> Result<Json<StatsSummary>, ApiError> {
    let validated = params.validate()?;

    let stats = archive
        .stats(
            viewer.session(),
            &validated.query,
            &validated.list,
            &validated.domain,
        )
        .await?;

    Ok(Json(stats))
}
