/*!
# ydb-connect

<b>An asynchronous, locality-aware Rust client for the YDB query service.</b>

This crate speaks the YDB streaming gRPC protocol and keeps the whole
client-side machinery running for you: it discovers cluster endpoints,
maintains a grid of persistent connections balanced across locations, keeps a
pool of attached server-side sessions warm, and turns streamed result parts
into ready-to-use results.

## ✨ Features

- ⚙️ **Endpoint discovery** — the cluster topology is refreshed periodically
  and connection state follows it automatically;
- 🧭 **Locality-aware balancing** — requests prefer the locations you name
  and fall back across the cluster on failure;
- 🪶 **Async execution** using `tokio` and `tonic`;
- 🧾 **Session pool** — sessions are created, attached and recycled in the
  background; queries just borrow one;
- 🧩 **Parameterized queries and transactions** with a fluent builder.

## Getting Started

```no_run
use std::time::Duration;
use ydb_connect::{Client, Config};

# #[tokio::main]
# async fn main() -> Result<(), ydb_connect::Error> {
// 1️⃣ Connect and wait for the session pool to warm up
let client = Client::connect(
    Config::new(["grpc://localhost:2136"], "/local/testdb")
        .with_location_preference(["zone-a", "zone-b"]),
)
.await?;
client.wait_ready(Duration::from_secs(5)).await;

// 2️⃣ One-shot query in an auto-committed transaction
let res = client
    .query()
    .query("DECLARE $id AS Uint64; SELECT $id AS id;")
    .param("$id", ydb_connect::value::uint64(42))
    .exec()
    .await?;
println!("rows: {}", res.rows().len());

// 3️⃣ Multi-statement transaction
let mut tx = client.query().tx().await?;
tx.query("UPSERT INTO t (id) VALUES (1);").exec().await?;
tx.query("UPSERT INTO t (id) VALUES (2);").commit().exec().await?;

client.close().await;
# Ok(())
# }
```

## 🧠 Concepts

- <b>[`Client`]</b> — owns discovery, balancing and the session pool; the
  entry point for everything.
- <b>[`QueryClient`]</b> — the execution surface: one-shot statements, the
  query builder and transactions. Derived handles switch the default
  transaction mode per call site.
- <b>[`Transaction`]</b> — pinned to one session until committed, rolled
  back or dropped.
- <b>[`QueryResult`]</b> — assembled from the server's result part stream;
  rows can also be streamed to your own sink as they arrive.

## ⚙️ Requirements

- A reachable YDB cluster (the query service must be enabled);
- `tokio` runtime.
*/

mod client;
mod config;
mod discovery;
mod error;
mod hashing;
mod pool;
mod query;
mod transport;

pub mod ydb;

pub use client::Client;
pub use config::{Config, Credentials};
pub use discovery::endpoints::{Announcement, EndpointInfo};
pub use error::Error;
pub use query::result::QueryResult;
pub use query::transaction::{Transaction, TxMode, TxQuery};
pub use query::{Query, QueryClient};
pub use ydb::value;
