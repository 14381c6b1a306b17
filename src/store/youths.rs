use chrono::{Datelike, Duration, NaiveDate};
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, info};

use super::base::{after_write, ListCache, StoreState};
use super::selection::ChapterSelection;
use crate::client::{ApiClient, ApiError};
use crate::models::{NewYouth, Youth};

pub const YOUTHS_PATH: &str = "/api/youths/";
pub const KARYAKARTAS_PATH: &str = "/api/youths/get-all-karyakarta";

/// Roster of the selected chapter, plus the chapter's karyakartas for
/// assignment pickers.
pub struct YouthStore {
    api: Arc<ApiClient>,
    youths: ListCache<Youth>,
    karyakartas: ListCache<Youth>,
}

impl YouthStore {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            youths: ListCache::new("youths"),
            karyakartas: ListCache::new("karyakartas"),
        }
    }

    pub async fn snapshot(&self) -> StoreState<Youth> {
        self.youths.snapshot().await
    }

    pub async fn karyakartas_snapshot(&self) -> StoreState<Youth> {
        self.karyakartas.snapshot().await
    }

    /// Load the roster of the selected chapter. With nothing selected the
    /// list is emptied and no request is sent.
    pub async fn fetch(&self, selection: ChapterSelection) -> Result<Vec<Youth>, ApiError> {
        scoped_load(&self.api, &self.youths, YOUTHS_PATH, selection).await
    }

    pub async fn fetch_karyakartas(
        &self,
        selection: ChapterSelection,
    ) -> Result<Vec<Youth>, ApiError> {
        scoped_load(&self.api, &self.karyakartas, KARYAKARTAS_PATH, selection).await
    }

    /// Writes fail only when the backend rejects them; the roster reload
    /// that follows reports through [`snapshot`](Self::snapshot).
    pub async fn create(
        &self,
        youth: &NewYouth,
        selection: ChapterSelection,
    ) -> Result<(), ApiError> {
        info!("Adding youth '{} {}'", youth.first_name, youth.last_name);
        self.api.send_json(Method::POST, YOUTHS_PATH, youth).await?;
        after_write("youth", self.fetch(selection).await);
        Ok(())
    }

    pub async fn update(
        &self,
        id: i64,
        youth: &NewYouth,
        selection: ChapterSelection,
    ) -> Result<(), ApiError> {
        info!("Updating youth {}", id);
        self.api
            .send_json(Method::PUT, &item_path(id), youth)
            .await?;
        after_write("youth", self.fetch(selection).await);
        Ok(())
    }

    pub async fn delete(&self, id: i64, selection: ChapterSelection) -> Result<(), ApiError> {
        info!("Removing youth {}", id);
        self.api.delete(&item_path(id)).await?;
        after_write("youth deletion", self.fetch(selection).await);
        Ok(())
    }

    /// Cached youths whose birthday falls in the Sunday-to-Saturday week
    /// containing `today`.
    pub async fn birthdays_in_week(&self, today: NaiveDate) -> Vec<Youth> {
        let week = week_of(today);
        self.youths
            .snapshot()
            .await
            .items
            .into_iter()
            .filter(|y| {
                y.birth_date
                    .is_some_and(|born| week.iter().any(|day| is_anniversary(born, *day)))
            })
            .collect()
    }
}

async fn scoped_load(
    api: &ApiClient,
    cache: &ListCache<Youth>,
    path: &str,
    selection: ChapterSelection,
) -> Result<Vec<Youth>, ApiError> {
    let Some(center) = selection.id() else {
        debug!("No sabha center selected, clearing {}", path);
        cache.clear().await;
        return Ok(Vec::new());
    };
    let query = [("sabha_center_id", center.to_string())];
    cache.load(api.get_json(path, &query)).await
}

fn item_path(id: i64) -> String {
    format!("{}{}", YOUTHS_PATH, id)
}

fn week_of(day: NaiveDate) -> Vec<NaiveDate> {
    let sunday = day - Duration::days(i64::from(day.weekday().num_days_from_sunday()));
    (0..7).map(|offset| sunday + Duration::days(offset)).collect()
}

/// Feb 29 birthdays are celebrated on Feb 28 in common years.
fn is_anniversary(born: NaiveDate, day: NaiveDate) -> bool {
    if born.month() == day.month() && born.day() == day.day() {
        return true;
    }
    born.month() == 2
        && born.day() == 29
        && day.month() == 2
        && day.day() == 28
        && NaiveDate::from_ymd_opt(day.year(), 2, 29).is_none()
}
