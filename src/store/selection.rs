use tokio::sync::watch;

/// The chapter (Sabha Center) a fetch is scoped to. Passed explicitly to every
/// scoped store operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChapterSelection {
    sabha_center_id: Option<i64>,
}

impl ChapterSelection {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn of(sabha_center_id: i64) -> Self {
        Self {
            sabha_center_id: Some(sabha_center_id),
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.sabha_center_id
    }
}

/// Holds the globally selected chapter for the lifetime of the process.
pub struct ChapterSelector {
    current: watch::Sender<ChapterSelection>,
}

impl ChapterSelector {
    pub fn new() -> Self {
        Self {
            current: watch::channel(ChapterSelection::none()).0,
        }
    }

    pub fn current(&self) -> ChapterSelection {
        *self.current.borrow()
    }

    pub fn select(&self, sabha_center_id: i64) {
        self.current.send_replace(ChapterSelection::of(sabha_center_id));
    }

    pub fn clear(&self) {
        self.current.send_replace(ChapterSelection::none());
    }

    /// Notified whenever the selection changes, so views can refetch.
    pub fn subscribe(&self) -> watch::Receiver<ChapterSelection> {
        self.current.subscribe()
    }
}

impl Default for ChapterSelector {
    fn default() -> Self {
        Self::new()
    }
}

/// The event (Sabha) currently opened for attendance taking.
pub struct CurrentSabha {
    id: watch::Sender<Option<i64>>,
}

impl CurrentSabha {
    pub fn new() -> Self {
        Self {
            id: watch::channel(None).0,
        }
    }

    pub fn get(&self) -> Option<i64> {
        *self.id.borrow()
    }

    pub fn set(&self, sabha_id: i64) {
        self.id.send_replace(Some(sabha_id));
    }

    pub fn clear(&self) {
        self.id.send_replace(None);
    }
}

impl Default for CurrentSabha {
    fn default() -> Self {
        Self::new()
    }
}
