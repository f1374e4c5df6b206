//! # Engine Module
//!
//! The stateful layer of cemc: everything that changes while a Monte Carlo
//! driver proposes, accepts and rejects moves.
//!
//! ## Overview
//!
//! Two structures carry the simulation state. The [`updater::CeUpdater`] keeps
//! the correlation functions of the current configuration in sync with single
//! and paired species changes, and turns them into a cluster-expansion energy.
//! The [`tracker::ClusterTracker`] follows how solute atoms connect into
//! clusters and can tell, without committing anything, whether a swap would
//! split them.
//!
//! ## Architecture
//!
//! - **Moves** ([`change`]) - Site changes, paired swaps and their validation
//! - **History** ([`history`]) - Bounded stack of pending changes with correlation snapshots
//! - **Updater** ([`updater`]) - Incremental correlation functions, energy, undo
//! - **Connectivity** ([`tracker`]) - Union forest over solute sites, statistics, probes
//! - **Extras** ([`positions`], [`vibration`]) - Species position index and a linear vibrational term
//! - **Configuration** ([`config`]) - Validated Monte Carlo parameters
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress reporting
//! - **Error Handling** ([`error`]) - Engine error type and its coarse kinds
//!
//! ## Protocol
//!
//! A driver calls [`updater::CeUpdater::calculate`] with a move, optionally
//! probes [`tracker::ClusterTracker::move_creates_new_cluster`], then either
//! commits (`clear_history` plus `update_clusters`) or rolls back
//! (`undo_changes`). The tracker is never told about rejected moves.

pub mod change;
pub mod config;
pub mod error;
pub mod history;
pub mod positions;
pub mod progress;
pub mod tracker;
pub mod updater;
pub mod vibration;
