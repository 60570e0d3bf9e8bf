//! Sighting reports, voting, feed filtering, ticket scans, notifications

use std::path::PathBuf;
use tracing::warn;

use crate::types::{Notification, VoteKind};

use super::{App, ScanPhase};

impl App {
    /// Report a TAPS sighting in the selected lot.
    ///
    /// A guarded no-op with zero API calls when no lot is selected. No
    /// optimistic update: state changes only after the server confirms,
    /// at which point the lot and feed data are refreshed and a success
    /// message reports how many parkers were notified.
    pub async fn report_sighting(&self, notes: Option<String>) {
        let Some(lot_id) = self.snapshot().selected_lot else {
            self.update(|s| s.error = Some("Select a lot before reporting".to_string()));
            return;
        };

        match self
            .backend
            .report_sighting(&lot_id, notes.as_deref())
            .await
        {
            Ok(receipt) => {
                self.update(|s| {
                    s.success_message = Some(format!(
                        "Sighting reported. {} parkers notified.",
                        receipt.users_notified
                    ));
                });
                self.reload_lot_data(&lot_id).await;
                self.reload_feed(false).await;
            }
            Err(e) => self.surface(&e, "Could not report sighting"),
        }
    }

    /// Toggle this device's vote on a sighting in the active feed view.
    ///
    /// Voting the kind already in place removes the vote; anything else
    /// sets or changes it. Exactly one of {set, remove} is issued. The
    /// count delta is applied to local state before the call completes
    /// (optimistic update); on failure the pre-call feed is restored and
    /// the error surfaced.
    pub async fn vote(&self, sighting_id: &str, kind: VoteKind) {
        let snapshot = self.snapshot();
        let Some(current_vote) = snapshot.feed.user_vote(sighting_id) else {
            self.update(|s| s.error = Some("That sighting is no longer in the feed".to_string()));
            return;
        };
        let removing = current_vote == Some(kind);
        let before = snapshot.feed;

        self.update(|s| {
            if let Some(sighting) = s.feed.find_mut(sighting_id) {
                if removing {
                    sighting.retract_vote();
                } else {
                    sighting.cast_vote(kind);
                }
            }
        });

        let result = if removing {
            self.backend.remove_vote(sighting_id).await
        } else {
            self.backend.cast_vote(sighting_id, kind).await
        };

        if let Err(e) = result {
            self.update(|s| s.feed = before);
            self.surface(&e, "Vote failed");
        }
    }

    /// Switch the active feed view: `None` selects the aggregate
    /// all-lots feed, `Some` a single lot's feed. The two views are
    /// mutually exclusive.
    pub async fn select_feed_filter(&self, lot_id: Option<String>) {
        self.update(|s| s.feed_filter = lot_id);
        self.reload_feed(true).await;
    }

    /// Stage a ticket image for scanning (`idle → preview`).
    pub fn select_scan_image(&self, image_path: PathBuf) {
        self.update(|s| s.scan = ScanPhase::Preview { image_path });
    }

    /// Submit the staged ticket image (`preview → processing →
    /// success | error`). On success with an attached sighting, the feed
    /// and lot stats are refreshed.
    pub async fn submit_ticket_scan(&self) {
        let ScanPhase::Preview { image_path } = self.snapshot().scan else {
            self.update(|s| s.error = Some("Select a ticket image first".to_string()));
            return;
        };
        self.update(|s| s.scan = ScanPhase::Processing);

        let image = match tokio::fs::read(&image_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.update(|s| {
                    s.scan = ScanPhase::Error(format!("Could not read image: {}", e))
                });
                return;
            }
        };
        let filename = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ticket.jpg".to_string());

        match self.backend.scan_ticket(image, &filename).await {
            Ok(response) if response.success => {
                let created_sighting = response.outcome.sighting_id.is_some();
                self.update(|s| s.scan = ScanPhase::Success(response.outcome));
                if created_sighting {
                    self.reload_feed(false).await;
                    if let Some(lot_id) = self.snapshot().selected_lot {
                        self.reload_lot_data(&lot_id).await;
                    }
                }
            }
            Ok(_) => self.update(|s| {
                s.scan = ScanPhase::Error("The ticket could not be read".to_string());
            }),
            Err(e) => {
                let message = e.user_message("Scan failed");
                self.update(|s| s.scan = ScanPhase::Error(message));
            }
        }
    }

    /// Return the scan sub-machine to `idle` from any state.
    pub fn reset_scan(&self) {
        self.update(|s| s.scan = ScanPhase::Idle);
    }

    /// Refresh the unread-notification count. Non-fatal: failures are
    /// logged without touching the user-visible error field.
    pub async fn fetch_unread_count(&self) {
        match self.backend.unread_notifications().await {
            Ok(unread) => self.update(|s| s.unread_count = unread.unread_count),
            Err(e) => warn!("failed to fetch unread count: {}", e),
        }
    }

    /// List unread notifications. Failures are logged and yield an
    /// empty list.
    pub async fn notifications(&self) -> Vec<Notification> {
        match self.backend.unread_notifications().await {
            Ok(unread) => {
                self.update(|s| s.unread_count = unread.unread_count);
                unread.notifications
            }
            Err(e) => {
                warn!("failed to list notifications: {}", e);
                Vec::new()
            }
        }
    }

    /// Mark every unread notification read. Non-fatal, like the count
    /// fetch.
    pub async fn mark_all_read(&self) {
        let unread = match self.backend.unread_notifications().await {
            Ok(unread) => unread,
            Err(e) => {
                warn!("failed to list notifications: {}", e);
                return;
            }
        };
        if unread.notifications.is_empty() {
            self.update(|s| s.unread_count = 0);
            return;
        }

        let ids: Vec<String> = unread.notifications.iter().map(|n| n.id.clone()).collect();
        match self.backend.mark_notifications_read(&ids).await {
            Ok(()) => self.update(|s| s.unread_count = 0),
            Err(e) => warn!("failed to mark notifications read: {}", e),
        }
    }

    /// Refresh campus-wide totals. Non-fatal background data.
    pub async fn load_campus_stats(&self) {
        match self.backend.campus_stats().await {
            Ok(stats) => self.update(|s| s.campus_stats = Some(stats)),
            Err(e) => warn!("failed to load campus stats: {}", e),
        }
    }
}
