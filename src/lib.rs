//! # Lodestone
//!
//! A certificate-aware document-store connector and semantic retrieval
//! engine for chat assistants.
//!
//! Lodestone establishes a trustworthy connection to a remote document
//! store under heterogeneous, frequently-misconfigured authentication
//! conditions, bootstraps the schema it needs, and grounds conversational
//! responses with similarity search over an embedded reference corpus.
//! It never crashes the serving process: with the store unreachable it
//! degrades to empty results instead of raising.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Certificate  │──▶│  Connection   │──▶│ StoreHandle  │
//! │ Materializer │   │ StrategyChain │   │ Conn/Degraded│
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │
//!                    ┌─────────────────────────┤
//!                    ▼                         ▼
//!              ┌──────────┐             ┌────────────┐
//!              │ Schema    │             │ Retrieval  │◀── Embedder
//!              │ Bootstrap │             │ + Metrics  │
//!              └──────────┘             └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lode init                        # connect, bootstrap schema, seed corpus
//! lode check                       # validate config and certificate offline
//! lode search "MSC harvesting"     # ranked similarity search
//! lode ingest --title T --category C --content "..."
//! lode status                      # fresh chain run + collection counts
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with environment overrides |
//! | [`error`] | Subsystem error taxonomy |
//! | [`certificate`] | Certificate materialization and repair |
//! | [`connect`] | Ordered connection strategy chain |
//! | [`store`] | Store client and degraded-safe handle |
//! | [`bootstrap`] | Idempotent schema/index bootstrap |
//! | [`embedding`] | Sentence encoders (MiniLM, hashed) |
//! | [`retrieval`] | Similarity search and ingestion |
//! | [`metrics`] | Running search metrics |
//! | [`chatlog`] | Chat transcript persistence |
//! | [`seed`] | Starter corpus seeding |
//! | [`runtime`] | Startup context object |

pub mod bootstrap;
pub mod certificate;
pub mod chatlog;
pub mod config;
pub mod connect;
pub mod embedding;
pub mod error;
pub mod metrics;
pub mod models;
pub mod retrieval;
pub mod runtime;
pub mod seed;
pub mod store;
