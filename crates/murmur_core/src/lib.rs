/*
 * SPDX-FileCopyrightText: 2026 Murmur Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod actions;
pub mod config;
pub mod media_store;
pub mod social_db;
pub mod text;
