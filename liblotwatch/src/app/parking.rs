//! Lot selection and parking-session transitions

use tracing::warn;

use super::{App, FeedView};

impl App {
    /// Select a lot and reload its stats, prediction, and feed.
    ///
    /// The three reloads are independent: a failure in one neither
    /// blocks nor rolls back the others. Only a lot-details failure is
    /// surfaced; the rest are logged.
    pub async fn select_lot(&self, lot_id: &str) {
        self.update(|s| {
            s.selected_lot = Some(lot_id.to_string());
            s.feed_filter = Some(lot_id.to_string());
            s.is_loading = true;
        });
        self.reload_lot_data(lot_id).await;
        self.update(|s| s.is_loading = false);
    }

    /// Open a parking session in the selected lot.
    ///
    /// Rejected client-side, with no API call, when a session is already
    /// active. On success the new session replaces the old state and the
    /// lot's data is refreshed; on failure the prior session state is
    /// left untouched.
    pub async fn check_in(&self) {
        let snapshot = self.snapshot();
        if snapshot.is_parked() {
            self.update(|s| s.error = Some("Already checked in to a lot".to_string()));
            return;
        }
        let Some(lot_id) = snapshot.selected_lot else {
            self.update(|s| s.error = Some("Select a lot before checking in".to_string()));
            return;
        };

        match self.backend.check_in(&lot_id).await {
            Ok(session) => {
                let lot_name = session.lot_name.clone();
                self.update(|s| {
                    s.current_session = Some(session);
                    s.success_message = Some(format!("Checked in to {}", lot_name));
                });
                self.reload_lot_data(&lot_id).await;
            }
            Err(e) => self.surface(&e, "Check-in failed"),
        }
    }

    /// Close the active parking session.
    ///
    /// Rejected client-side, with no API call, when not parked.
    pub async fn check_out(&self) {
        let snapshot = self.snapshot();
        if !snapshot.is_parked() {
            self.update(|s| s.error = Some("Not currently parked".to_string()));
            return;
        }

        match self.backend.check_out().await {
            Ok(response) => {
                self.update(|s| {
                    s.current_session = None;
                    s.success_message = Some(response.message);
                });
                if let Some(lot_id) = snapshot.selected_lot {
                    self.reload_lot_data(&lot_id).await;
                }
            }
            Err(e) => self.surface(&e, "Check-out failed"),
        }
    }

    /// Re-issue the lot, prediction, feed, session, and unread-count
    /// calls for the current selection without changing it.
    pub async fn refresh(&self) {
        self.update(|s| s.is_loading = true);

        match self.backend.current_session().await {
            Ok(session) => self.update(|s| s.current_session = session),
            Err(e) => warn!("failed to refresh current session: {}", e),
        }

        if let Some(lot_id) = self.snapshot().selected_lot {
            self.reload_lot_data(&lot_id).await;
        }
        self.reload_feed(false).await;
        self.fetch_unread_count().await;

        self.update(|s| s.is_loading = false);
    }

    /// Fetch stats, prediction, and feed for one lot concurrently, each
    /// folded into state independently of the others' outcomes.
    pub(crate) async fn reload_lot_data(&self, lot_id: &str) {
        let (stats, prediction, feed) = futures::join!(
            self.backend.lot_stats(lot_id),
            self.backend.prediction(lot_id),
            self.backend.lot_feed(lot_id),
        );

        match stats {
            Ok(stats) => self.update(|s| {
                s.lot_stats.insert(stats.lot.id.clone(), stats);
            }),
            Err(e) => self.surface(&e, "Could not load lot details"),
        }

        match prediction {
            Ok(prediction) => self.update(|s| {
                // Drop a stale result if the selection moved mid-flight
                if s.selected_lot.as_deref() == Some(prediction.lot_id.as_str()) {
                    s.prediction = Some(prediction);
                }
            }),
            Err(e) => warn!("failed to load prediction for {}: {}", lot_id, e),
        }

        match feed {
            Ok(feed) => self.update(|s| {
                if s.feed_filter.as_deref() == Some(feed.lot.id.as_str()) {
                    s.feed = FeedView::Lot(feed);
                }
            }),
            Err(e) => warn!("failed to load feed for {}: {}", lot_id, e),
        }
    }
}
