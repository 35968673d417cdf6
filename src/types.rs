//! Invocation envelope types in the S3 Object Lambda JSON shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default)]
    pub access_point_arn: String,
    #[serde(default)]
    pub supporting_access_point_arn: String,
    #[serde(default)]
    pub payload: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetObjectContext {
    pub input_s3_url: String,
    pub output_route: String,
    pub output_token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadObjectContext {
    pub input_s3_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetObjectInput {
    #[serde(default)]
    pub x_amz_request_id: String,
    #[serde(default)]
    pub configuration: Configuration,
    #[serde(default)]
    pub user_request: UserRequest,
    #[serde(default)]
    pub user_identity: serde_json::Value,
    #[serde(default)]
    pub protocol_version: String,
    pub get_object_context: GetObjectContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetObjectOutput {
    pub status_code: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadObjectInput {
    #[serde(default)]
    pub x_amz_request_id: String,
    #[serde(default)]
    pub configuration: Configuration,
    #[serde(default)]
    pub user_request: UserRequest,
    #[serde(default)]
    pub user_identity: serde_json::Value,
    #[serde(default)]
    pub protocol_version: String,
    pub head_object_context: HeadObjectContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadObjectOutput {
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    pub headers: Option<BTreeMap<String, String>>,
}

/// Either kind of invocation event, told apart by its context field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InvocationEvent {
    GetObject(Box<GetObjectInput>),
    HeadObject(Box<HeadObjectInput>),
}
