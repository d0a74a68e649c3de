/*
 * SPDX-FileCopyrightText: 2026 Murmur Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::path::PathBuf;

/// Service configuration, passed in explicitly at construction. Handlers
/// never reach for ambient application state.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub posts_per_page: u32,
    pub comments_per_page: u32,
    /// Page size for follower/following listings.
    pub users_per_page: u32,
    pub notifications_per_page: u32,
    /// Accounts shown in the explore sidebar.
    pub suggested_users: u32,
    /// Cap on user results in search responses.
    pub search_users_cap: u32,
    pub trending_window_days: i64,
    pub upload_dir: PathBuf,
    pub allowed_extensions: Vec<String>,
}

impl AppConfig {
    pub fn trending_window_ms(&self) -> i64 {
        self.trending_window_days.max(0) * 24 * 3600 * 1000
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            posts_per_page: 10,
            comments_per_page: 20,
            users_per_page: 20,
            notifications_per_page: 20,
            suggested_users: 5,
            search_users_cap: 10,
            trending_window_days: 7,
            upload_dir: PathBuf::from("static/uploads"),
            allowed_extensions: ["jpg", "jpeg", "png", "gif", "webp", "mp4", "mov"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}
