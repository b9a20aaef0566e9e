/*!
# FinTrack

A personal finance tracker: a REST API server plus an offline-first client, built in Rust.

## Overview

Users register, log in, record income and expense transactions, set monthly
budgets per category, track savings goals and read dashboard summaries. Amounts
are Indonesian Rupiah and are displayed as `Rp 1.500.000`.

## Architecture

### Server
- **Technologies**: Rust, axum, tower-http
- **Key Components**:
  - Store - `users.json` plus one gzip-compressed bincode ledger per user
  - Auth - argon2 password hashes and expiring opaque session tokens
  - Sync endpoint - whole-state pull and last-write-wins push
  - REST endpoints - CRUD for transactions, categories, budgets and goals
  - Dashboard - totals, budget progress, cash flow and goal progress

### Client
- **Local cache** - a key/value store laid out like browser local storage,
  holding one data block per login email
- **Sync client** - applies every edit locally first, pushes when online and
  falls back to offline mode when the server cannot be reached

## Data Persistence
- `users.json` with account records
- `<user id>/ledger.bin.gz` with the user's categories, transactions, budgets and goals
- CSV export/import of transactions, gzip+bincode ledger backups

## Modules

- **model**: records, defaults, amount parsing and Rupiah formatting
- **ledger**: validated CRUD operations on one user's data
- **summary**: dashboard computations
- **saving**: ledger file codec
- **store**: file-backed user database
- **auth**: registration, login, sessions, password changes
- **sync**: sync push payload and the server-side merge
- **cache**: client local storage
- **client**: sync transports and the offline-first sync client
- **downloader**: CSV export/import
- **app**: routing and middleware (feature `web`)

## REST API Endpoints

- `POST /api/auth/register`, `POST /api/auth/login`, `POST /api/auth/logout`
- `GET|POST /api/profile`, `POST /api/profile/password`
- `GET|POST /api/data/sync`
- `/api/transactions`, `/api/categories`, `/api/budgets`, `/api/goals`
- `GET /api/dashboard?year=&month=`
- `GET /api/export/transactions.csv`, `POST /api/import/transactions`
- `GET /api/export/ledger`, `POST /api/import/ledger`
*/

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod downloader;
pub mod error;
pub mod ledger;
pub mod model;
pub mod saving;
pub mod store;
pub mod summary;
pub mod sync;

#[cfg(feature = "web")]
pub mod app;

pub use error::{FinError, Result};
pub use model::{Category, Goal, Kind, Ledger, Profile, Snapshot, Transaction};
