//! PesaTips - M-Pesa subscription gating for VIP sports tips
//!
//! This library provides the payment initiation pipeline (Daraja STK push),
//! the callback reconciler, the entitlement ledger, and the voucher
//! redemption path, plus the HTTP handlers that expose them.

pub mod config;
pub mod db;
pub mod entitlements;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod id;
pub mod middleware;
pub mod models;
pub mod mpesa;
