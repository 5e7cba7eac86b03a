use crate::auth::AccessTokenProvider;
use crate::http::{decode_json, send_with_retry};
use crate::paging::next_page;
use crate::strava_models::{
    AthleteRef, DetailedActivity, STREAM_KEYS, StreamSet, SummaryActivity, streams_from_set,
};
use pacer_core::model::{ActivityInfo, ActivitySourceData, FetchedActivity};
use pacer_core::source::{
    ActivityPage, ActivityQuery, ActivitySource, SourceError, SourceFuture,
};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

const USER_AGENT: &str = "pacer";
const MAX_ATTEMPTS: u32 = 3;

/// Activity source backed by the Strava v3 REST API.
pub struct StravaSource {
    client: Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenProvider>,
    athlete_id: OnceCell<u64>,
}

impl StravaSource {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            athlete_id: OnceCell::new(),
        }
    }

    async fn token(&self) -> Result<String, SourceError> {
        self.tokens
            .access_token()
            .await
            .map_err(|err| SourceError::Unauthorized(format!("{err:#}")))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        subject: &str,
    ) -> Result<T, SourceError> {
        let token = self.token().await?;
        let response = send_with_retry(
            || {
                self.client
                    .get(url)
                    .header("User-Agent", USER_AGENT)
                    .bearer_auth(&token)
            },
            subject,
            MAX_ATTEMPTS,
        )
        .await?;
        decode_json(response, subject).await
    }

    /// Id of the authenticated athlete, fetched once.
    async fn athlete_id(&self) -> Result<u64, SourceError> {
        self.athlete_id
            .get_or_try_init(|| async {
                let url = format!("{}/athlete", self.base_url);
                let athlete: AthleteRef = self.get_json(&url, "athlete").await?;
                debug!(athlete_id = athlete.id, "resolved authenticated athlete");
                Ok(athlete.id)
            })
            .await
            .copied()
    }

    async fn list(&self, query: ActivityQuery) -> Result<ActivityPage, SourceError> {
        let self_id = self.athlete_id().await?;
        let mut url = format!(
            "{}/athlete/activities?page={}&per_page={}",
            self.base_url, query.page, query.per_page
        );
        if let Some(after) = query.after {
            url.push_str(&format!("&after={}", after.unix_timestamp()));
        }
        let items: Vec<SummaryActivity> = self.get_json(&url, "athlete activities").await?;
        let received = items.len();
        let activities = items
            .into_iter()
            .map(|item| ActivityInfo {
                id: item.id.to_string(),
                activity_type: item.activity_type(),
                is_owner: item.athlete.id == self_id,
                is_trainer: item.trainer,
                supports_gap: item.activity_type().is_running(),
                start_time: item.start_date,
                name: item.name,
            })
            .collect();
        Ok(ActivityPage {
            page: query.page,
            activities,
            next_page: next_page(query.page, received, query.per_page),
        })
    }

    async fn fetch(&self, activity: &ActivityInfo) -> Result<FetchedActivity, SourceError> {
        let detail_url = format!("{}/activities/{}", self.base_url, activity.id);
        let detail: DetailedActivity = self.get_json(&detail_url, &activity.id).await?;
        let streams_url = format!(
            "{}/activities/{}/streams?keys={}&key_by_type=true",
            self.base_url, activity.id, STREAM_KEYS
        );
        let streams: StreamSet = self.get_json(&streams_url, &activity.id).await?;
        let author_gender = detail.athlete.gender();
        Ok(FetchedActivity {
            source: ActivitySourceData {
                moving_time: detail.moving_time,
                elapsed_time: detail.elapsed_time,
                distance: detail.distance,
                elevation_gain: detail.total_elevation_gain,
                has_power_meter: detail.device_watts,
                athlete_weight: detail.athlete.weight,
                athlete_gender: author_gender,
            },
            streams: streams_from_set(streams),
        })
    }
}

impl ActivitySource for StravaSource {
    fn name(&self) -> &'static str {
        "strava"
    }

    fn list_activities<'a>(&'a self, query: ActivityQuery) -> SourceFuture<'a, ActivityPage> {
        Box::pin(self.list(query))
    }

    fn fetch_activity<'a>(
        &'a self,
        activity: &'a ActivityInfo,
    ) -> SourceFuture<'a, FetchedActivity> {
        Box::pin(self.fetch(activity))
    }

    fn validate_auth<'a>(&'a self) -> SourceFuture<'a, ()> {
        Box::pin(async move { self.athlete_id().await.map(|_| ()) })
    }
}
