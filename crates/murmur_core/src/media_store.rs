/*
 * SPDX-FileCopyrightText: 2026 Murmur Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Local media reference store. The core only ever records the stored
//! filename on a post or profile; byte handling stays behind this wall.

use anyhow::{Context, Result};
use rand::{rngs::OsRng, RngCore};
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn folder_path(&self, folder: &str) -> PathBuf {
        self.root.join(folder)
    }

    /// Extension allow-list check on the original upload name.
    pub fn allowed_file(filename: &str, allowed: &[String]) -> bool {
        match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_lowercase();
                allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext))
            }
            _ => false,
        }
    }

    /// Collision-proof stored name: caller prefix plus a random hex token,
    /// keeping the upload's extension.
    pub fn stored_name(prefix: &str, original: &str) -> String {
        let mut token = [0u8; 8];
        OsRng.fill_bytes(&mut token);
        let ext = original
            .rsplit_once('.')
            .map(|(_, e)| e.to_lowercase())
            .unwrap_or_default();
        if ext.is_empty() {
            format!("{prefix}_{}", hex::encode(token))
        } else {
            format!("{prefix}_{}.{ext}", hex::encode(token))
        }
    }

    pub fn save(&self, folder: &str, name: &str, bytes: &[u8]) -> Result<String> {
        let dir = self.folder_path(folder);
        std::fs::create_dir_all(&dir).with_context(|| format!("create media dir {}", dir.display()))?;
        let path = dir.join(name);
        std::fs::write(&path, bytes).with_context(|| format!("write media {}", path.display()))?;
        Ok(name.to_string())
    }

    /// Best-effort removal. A missing file or an I/O failure must never
    /// fail the surrounding record deletion.
    pub fn remove(&self, folder: &str, name: &str) {
        let path = self.folder_path(folder).join(name);
        if !path.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("media removal failed for {}: {e}", path.display());
        }
    }

    pub fn exists(&self, folder: &str, name: &str) -> bool {
        self.folder_path(folder).join(name).exists()
    }
}
