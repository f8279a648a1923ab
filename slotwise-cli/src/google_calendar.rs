//! Google Calendar provider (feature `gcal`).
//!
//! Expects the OAuth client secret downloaded from the Google Cloud console
//! (Desktop app) at `<home>/google_client_secret.json`. Tokens are cached in
//! `<home>/google_token_cache.json`; yup-oauth2 acquires and refreshes them.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_calendar3::CalendarHub;
use google_calendar3::api::{Event, EventDateTime};
use google_calendar3::oauth2;
use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;
use slotwise_core::EventPayload;
use slotwise_sync::{CalendarClient, RemoteEvent};
use std::path::Path;

const CLIENT_SECRET_FILE: &str = "google_client_secret.json";
const TOKEN_CACHE_FILE: &str = "google_token_cache.json";

type Hub = CalendarHub<HttpsConnector<HttpConnector>>;

pub struct GoogleCalendar {
    hub: Hub,
    calendar_id: String,
}

impl GoogleCalendar {
    pub async fn connect(home: &Path, calendar_id: &str) -> Result<Self> {
        let secret_path = home.join(CLIENT_SECRET_FILE);
        let secret = oauth2::read_application_secret(&secret_path)
            .await
            .with_context(|| format!("read {} (download it from the Google Cloud console)", secret_path.display()))?;

        let auth = oauth2::InstalledFlowAuthenticator::builder(secret, oauth2::InstalledFlowReturnMethod::HTTPRedirect)
            .persist_tokens_to_disk(home.join(TOKEN_CACHE_FILE))
            .build()
            .await
            .context("building oauth authenticator")?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_or_http()
            .enable_http1()
            .build();
        Ok(Self {
            hub: CalendarHub::new(hyper::Client::builder().build(connector), auth),
            calendar_id: calendar_id.to_string(),
        })
    }
}

fn to_event(payload: &EventPayload) -> Event {
    let at = |utc: DateTime<Utc>| EventDateTime {
        date_time: Some(utc),
        time_zone: Some(payload.time_zone.clone()),
        ..Default::default()
    };
    Event {
        summary: Some(payload.title.clone()),
        description: Some(payload.description.clone()),
        start: Some(at(payload.start_utc)),
        end: Some(at(payload.end_utc)),
        ..Default::default()
    }
}

fn from_event(ev: Event) -> Option<RemoteEvent> {
    Some(RemoteEvent {
        id: ev.id?,
        title: ev.summary.unwrap_or_default(),
        description: ev.description.unwrap_or_default(),
        start_utc: ev.start?.date_time?,
        end_utc: ev.end?.date_time?,
    })
}

/// Flatten API errors so the status code lands in the message the retry
/// classifier reads.
fn api_error(op: &str, err: google_calendar3::Error) -> anyhow::Error {
    match err {
        google_calendar3::Error::Failure(resp) => anyhow!("{op}: HTTP {}", resp.status().as_u16()),
        google_calendar3::Error::BadRequest(body) => {
            let code = body["error"]["code"].as_u64().unwrap_or(400);
            anyhow!("{op}: HTTP {code} {body}")
        }
        other => anyhow!("{op}: {other}"),
    }
}

#[async_trait]
impl CalendarClient for GoogleCalendar {
    async fn create_event(&self, payload: &EventPayload) -> Result<String> {
        let (_, created) = self
            .hub
            .events()
            .insert(to_event(payload), &self.calendar_id)
            .doit()
            .await
            .map_err(|e| api_error("insert event", e))?;
        created.id.context("insert event: response carried no id")
    }

    async fn update_event(&self, event_id: &str, payload: &EventPayload) -> Result<()> {
        self.hub
            .events()
            .update(to_event(payload), &self.calendar_id, event_id)
            .doit()
            .await
            .map_err(|e| api_error("update event", e))?;
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> Result<()> {
        self.hub
            .events()
            .delete(&self.calendar_id, event_id)
            .doit()
            .await
            .map_err(|e| api_error("delete event", e))?;
        Ok(())
    }

    async fn list_events(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<RemoteEvent>> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut call = self
                .hub
                .events()
                .list(&self.calendar_id)
                .time_min(from)
                .time_max(to)
                .single_events(true)
                .max_results(250);
            if let Some(token) = &page_token {
                call = call.page_token(token);
            }
            let (_, page) = call.doit().await.map_err(|e| api_error("list events", e))?;
            out.extend(page.items.unwrap_or_default().into_iter().filter_map(from_event));
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }
        Ok(out)
    }
}
