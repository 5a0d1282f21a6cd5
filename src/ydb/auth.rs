use super::operations::Operation;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoginRequest {
    #[prost(string, tag = "2")]
    pub user: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub password: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoginResponse {
    #[prost(message, optional, tag = "1")]
    pub operation: ::core::option::Option<Operation>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoginResult {
    #[prost(string, tag = "1")]
    pub token: ::prost::alloc::string::String,
}
