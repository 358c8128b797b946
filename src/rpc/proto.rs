//! Wire types of the `analytics.AnalyticsService` RPC (see
//! `proto/analytics.proto`) and the generated client/server stubs.

use crate::models::ClickInfo;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClickModel {
    #[prost(string, tag = "1")]
    pub ip: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub city: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub country: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RecordClickRequest {
    #[prost(string, tag = "1")]
    pub short_link: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub click: ::core::option::Option<ClickModel>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct RecordClickResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
}

impl From<ClickInfo> for ClickModel {
    fn from(click: ClickInfo) -> Self {
        Self {
            ip: click.ip,
            city: click.city,
            country: click.country,
        }
    }
}

impl From<ClickModel> for ClickInfo {
    fn from(click: ClickModel) -> Self {
        ClickInfo::new(click.ip, click.city, click.country)
    }
}

include!(concat!(env!("OUT_DIR"), "/analytics.AnalyticsService.rs"));
