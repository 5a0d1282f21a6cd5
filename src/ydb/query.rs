use std::collections::HashMap;

use super::issue::IssueMessage;
use super::status::StatusCode;
use super::value::{Type, TypedValue, Value};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
)]
#[repr(i32)]
pub enum ExecMode {
    ExecModeUnspecified = 0,
    Parse = 10,
    Validate = 20,
    Explain = 30,
    Execute = 50,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
)]
#[repr(i32)]
pub enum StatsMode {
    StatsModeUnspecified = 0,
    None = 10,
    Basic = 20,
    Full = 30,
    Profile = 40,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
)]
#[repr(i32)]
pub enum Syntax {
    SyntaxUnspecified = 0,
    YqlV1 = 1,
    Pg = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateSessionRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateSessionResponse {
    #[prost(enumeration = "StatusCode", tag = "1")]
    pub status: i32,
    #[prost(message, repeated, tag = "2")]
    pub issues: ::prost::alloc::vec::Vec<IssueMessage>,
    #[prost(string, tag = "3")]
    pub session_id: ::prost::alloc::string::String,
    #[prost(int64, tag = "4")]
    pub node_id: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AttachSessionRequest {
    #[prost(string, tag = "1")]
    pub session_id: ::prost::alloc::string::String,
}

/// One frame of the attach stream. A SUCCESS status signals the session is
/// attached on the server side.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SessionState {
    #[prost(enumeration = "StatusCode", tag = "1")]
    pub status: i32,
    #[prost(message, repeated, tag = "2")]
    pub issues: ::prost::alloc::vec::Vec<IssueMessage>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteSessionRequest {
    #[prost(string, tag = "1")]
    pub session_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteSessionResponse {
    #[prost(enumeration = "StatusCode", tag = "1")]
    pub status: i32,
    #[prost(message, repeated, tag = "2")]
    pub issues: ::prost::alloc::vec::Vec<IssueMessage>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SerializableModeSettings {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OnlineModeSettings {
    #[prost(bool, tag = "1")]
    pub allow_inconsistent_reads: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StaleModeSettings {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SnapshotModeSettings {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionSettings {
    #[prost(oneof = "transaction_settings::TxMode", tags = "1, 2, 3, 4")]
    pub tx_mode: ::core::option::Option<transaction_settings::TxMode>,
}

pub mod transaction_settings {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum TxMode {
        #[prost(message, tag = "1")]
        SerializableReadWrite(super::SerializableModeSettings),
        #[prost(message, tag = "2")]
        OnlineReadOnly(super::OnlineModeSettings),
        #[prost(message, tag = "3")]
        StaleReadOnly(super::StaleModeSettings),
        #[prost(message, tag = "4")]
        SnapshotReadOnly(super::SnapshotModeSettings),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionControl {
    #[prost(bool, tag = "10")]
    pub commit_tx: bool,
    #[prost(oneof = "transaction_control::TxSelector", tags = "1, 2")]
    pub tx_selector: ::core::option::Option<transaction_control::TxSelector>,
}

pub mod transaction_control {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum TxSelector {
        #[prost(string, tag = "1")]
        TxId(::prost::alloc::string::String),
        #[prost(message, tag = "2")]
        BeginTx(super::TransactionSettings),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionMeta {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryContent {
    #[prost(enumeration = "Syntax", tag = "1")]
    pub syntax: i32,
    #[prost(string, tag = "2")]
    pub text: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExecuteQueryRequest {
    #[prost(string, tag = "1")]
    pub session_id: ::prost::alloc::string::String,
    #[prost(enumeration = "ExecMode", tag = "2")]
    pub exec_mode: i32,
    #[prost(message, optional, tag = "3")]
    pub tx_control: ::core::option::Option<TransactionControl>,
    #[prost(oneof = "execute_query_request::Query", tags = "4")]
    pub query: ::core::option::Option<execute_query_request::Query>,
    #[prost(map = "string, message", tag = "6")]
    pub parameters: HashMap<::prost::alloc::string::String, TypedValue>,
    #[prost(enumeration = "StatsMode", tag = "8")]
    pub stats_mode: i32,
    #[prost(bool, tag = "9")]
    pub concurrent_result_sets: bool,
}

pub mod execute_query_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Query {
        #[prost(message, tag = "4")]
        QueryContent(super::QueryContent),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Column {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub r#type: ::core::option::Option<Type>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResultSet {
    #[prost(message, repeated, tag = "1")]
    pub columns: ::prost::alloc::vec::Vec<Column>,
    #[prost(message, repeated, tag = "2")]
    pub rows: ::prost::alloc::vec::Vec<Value>,
}

/// Aggregate execution statistics, sent on the final result part.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryStats {
    #[prost(uint64, tag = "2")]
    pub process_cpu_time_us: u64,
    #[prost(uint64, tag = "3")]
    pub total_duration_us: u64,
    #[prost(uint64, tag = "4")]
    pub total_cpu_time_us: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExecuteQueryResponsePart {
    #[prost(enumeration = "StatusCode", tag = "1")]
    pub status: i32,
    #[prost(message, repeated, tag = "2")]
    pub issues: ::prost::alloc::vec::Vec<IssueMessage>,
    #[prost(message, optional, tag = "3")]
    pub tx_meta: ::core::option::Option<TransactionMeta>,
    #[prost(int64, tag = "4")]
    pub result_set_index: i64,
    #[prost(message, optional, tag = "5")]
    pub result_set: ::core::option::Option<ResultSet>,
    #[prost(message, optional, tag = "6")]
    pub exec_stats: ::core::option::Option<QueryStats>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommitTransactionRequest {
    #[prost(string, tag = "1")]
    pub session_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub tx_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommitTransactionResponse {
    #[prost(enumeration = "StatusCode", tag = "1")]
    pub status: i32,
    #[prost(message, repeated, tag = "2")]
    pub issues: ::prost::alloc::vec::Vec<IssueMessage>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RollbackTransactionRequest {
    #[prost(string, tag = "1")]
    pub session_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub tx_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RollbackTransactionResponse {
    #[prost(enumeration = "StatusCode", tag = "1")]
    pub status: i32,
    #[prost(message, repeated, tag = "2")]
    pub issues: ::prost::alloc::vec::Vec<IssueMessage>,
}
