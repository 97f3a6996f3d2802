//! # imgboard
//!
//! Image ingestion for an image board: store an uploaded image as an original
//! plus a set of resized variants, serve the closest variant for a requested
//! width, and open a thread for each upload exactly once even when the
//! browser retries the POST.
//!
//! # Architecture
//!
//! ```text
//! create(token, file, subject, body)
//!   │  gate + validate + claim           UploadStateStore
//!   │  spool → decode → save original    ImageProcessor → VariantIndex
//!   │  enqueue variant job ─────────────► VariantQueue workers
//!   │  create thread                       │ resize each width (rayon)
//!   ▼                                      │ register variants
//! thread id                                ▼ Succeeded / Failed
//! ```
//!
//! The storage directories are the source of truth. Image identity and width
//! are encoded in filenames, so [`VariantIndex::recover`](index::VariantIndex)
//! rebuilds the whole index from a directory listing at startup.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`index`] | Thread-safe UUID → metadata map with closest-width lookup |
//! | [`recovery`] | Rebuilds the index from the original and variant directories |
//! | [`processor`] | Saves originals and variants, fans widths out over rayon |
//! | [`imaging`] | Format whitelist, backend trait, `image`-crate backend |
//! | [`upload_state`] | Idempotency-token state machine and TTL sweeper |
//! | [`ingest`] | The orchestrator behind thread creation with an image |
//! | [`workers`] | Fixed-size variant job queue |
//! | [`threads`] | Thread repository seam plus an in-memory implementation |
//! | [`lookup`] | `{uuid}_{width}` references → file, content type, cache policy |
//! | [`naming`] | Stored filename and reference conventions |
//! | [`config`] | `imgboard.toml` loading, merging, and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Content Sniffing Only
//!
//! The client-supplied filename never decides the format. Uploads are sniffed
//! from their magic bytes and anything other than JPEG, PNG or GIF is
//! rejected, so a renamed file cannot slip through.
//!
//! ## Partial Variants Are Normal
//!
//! Each width is generated independently. If one fails the others are still
//! written, and readers get the nearest width that exists. A thread can be
//! visible before any variant is ready; lookups then serve the original.
//!
//! ## Bounded Background Work
//!
//! Variant generation runs on a fixed number of worker tasks fed by a
//! channel. Enqueueing never blocks the upload request, and the number of
//! images being resized at once stays at `processing.variant_workers`.

pub mod config;
pub mod imaging;
pub mod index;
pub mod ingest;
pub mod lookup;
pub mod naming;
pub mod output;
pub mod processor;
pub mod recovery;
pub mod threads;
pub mod upload_state;
pub mod workers;

#[cfg(test)]
pub(crate) mod test_helpers;
