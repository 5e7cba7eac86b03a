pub mod auth;
pub mod http;
mod paging;
pub mod strava;
mod strava_models;

pub use strava::StravaSource;
