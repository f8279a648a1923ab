//! Boundary request schema. Requests arriving as JSON are parsed into this
//! tagged union and validated before they reach the allocator or quota guard.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::time::parse_timezone;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Request {
    Schedule(ScheduleRequest),
    Sync(SyncRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default)]
    pub force_reschedule: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl Request {
    pub fn from_json(s: &str) -> Result<Self> {
        let req: Request = serde_json::from_str(s)
            .map_err(|e| Error::validation(format!("malformed request: {e}")))?;
        req.validate()?;
        Ok(req)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Request::Schedule(r) => r.validate(),
            Request::Sync(r) => r.validate(),
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Request::Schedule(r) => &r.user_id,
            Request::Sync(r) => &r.user_id,
        }
    }
}

impl ScheduleRequest {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            timezone: None,
            force_reschedule: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_user(&self.user_id)?;
        if let Some(tz) = &self.timezone {
            parse_timezone(tz)?;
        }
        Ok(())
    }

    /// Requested timezone, or `fallback` when none was given.
    pub fn resolve_timezone(&self, fallback: Tz) -> Result<Tz> {
        resolve(self.timezone.as_deref(), fallback)
    }
}

impl SyncRequest {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            timezone: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_user(&self.user_id)?;
        if let Some(tz) = &self.timezone {
            parse_timezone(tz)?;
        }
        Ok(())
    }

    pub fn resolve_timezone(&self, fallback: Tz) -> Result<Tz> {
        resolve(self.timezone.as_deref(), fallback)
    }
}

fn validate_user(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(Error::validation("userId must be non-empty"));
    }
    Ok(())
}

fn resolve(tz: Option<&str>, fallback: Tz) -> Result<Tz> {
    match tz {
        Some(name) => parse_timezone(name),
        None => Ok(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_schedule_request() {
        let req = Request::from_json(
            r#"{"action":"schedule","userId":"u1","timezone":"Europe/Berlin","forceReschedule":true}"#,
        )
        .unwrap();
        let Request::Schedule(s) = req else { panic!("expected schedule") };
        assert!(s.force_reschedule);
        assert_eq!(
            s.resolve_timezone(chrono_tz::UTC).unwrap(),
            chrono_tz::Europe::Berlin
        );
    }

    #[test]
    fn defaults_force_to_false() {
        let req = Request::from_json(r#"{"action":"schedule","userId":"u1"}"#).unwrap();
        assert_eq!(req, Request::Schedule(ScheduleRequest::new("u1")));
    }

    #[test]
    fn rejects_unknown_action_and_bad_fields() {
        for bad in [
            r#"{"action":"prioritize","userId":"u1"}"#,
            r#"{"action":"schedule"}"#,
            r#"{"action":"sync","userId":"  "}"#,
            r#"{"action":"sync","userId":"u1","timezone":"Nowhere/City"}"#,
            "not json",
        ] {
            let err = Request::from_json(bad).unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR", "input: {bad}");
        }
    }
}
