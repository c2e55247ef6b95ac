//! AWS error codes and their classification
//!
//! Every remote error passes through [`api_error`], which looks the code up
//! in the table of the service that returned it. A code the table does not
//! list is fatal, even when another service would recognise it.

use std::fmt;
use stratus_cloud::{ApiError, CloudError, ErrorKind};
use thiserror::Error;

/// AWS service family that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Ec2,
    S3,
    Autoscaling,
    Elb,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Ec2 => write!(f, "ec2"),
            Service::S3 => write!(f, "s3"),
            Service::Autoscaling => write!(f, "autoscaling"),
            Service::Elb => write!(f, "elb"),
        }
    }
}

/// Error codes the handlers recognise
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    InternetGatewayNotFound,
    GatewayNotAttached,
    DependencyViolation,
    NoSuchBucket,
    /// HeadBucket answers a missing bucket with a bare 404
    NotFound,
    BucketNotEmpty,
    LaunchConfigurationNotFound,
    ResourceInUse,
    LoadBalancerNotFound,
    InvalidLoadBalancerName,
    Unrecognized(String),
}

const KNOWN_CODES: &[(&str, ErrorCode)] = &[
    ("InvalidInternetGatewayID.NotFound", ErrorCode::InternetGatewayNotFound),
    ("Gateway.NotAttached", ErrorCode::GatewayNotAttached),
    ("DependencyViolation", ErrorCode::DependencyViolation),
    ("NoSuchBucket", ErrorCode::NoSuchBucket),
    ("NotFound", ErrorCode::NotFound),
    ("BucketNotEmpty", ErrorCode::BucketNotEmpty),
    ("InvalidConfiguration.NotFound", ErrorCode::LaunchConfigurationNotFound),
    ("ResourceInUse", ErrorCode::ResourceInUse),
    ("LoadBalancerNotFound", ErrorCode::LoadBalancerNotFound),
    ("InvalidLoadBalancerName.NotFound", ErrorCode::InvalidLoadBalancerName),
];

impl ErrorCode {
    pub fn parse(code: &str) -> Self {
        KNOWN_CODES
            .iter()
            .find(|(known, _)| *known == code)
            .map(|(_, parsed)| parsed.clone())
            .unwrap_or_else(|| ErrorCode::Unrecognized(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::Unrecognized(code) => code.as_str(),
            known => KNOWN_CODES
                .iter()
                .find(|(_, parsed)| parsed == known)
                .map(|(code, _)| *code)
                .unwrap_or_default(),
        }
    }
}

const EC2_TABLE: &[(ErrorCode, ErrorKind)] = &[
    (ErrorCode::InternetGatewayNotFound, ErrorKind::NotFound),
    (ErrorCode::GatewayNotAttached, ErrorKind::NotAttached),
    (ErrorCode::DependencyViolation, ErrorKind::DependencyViolation),
];

const S3_TABLE: &[(ErrorCode, ErrorKind)] = &[
    (ErrorCode::NoSuchBucket, ErrorKind::NotFound),
    (ErrorCode::NotFound, ErrorKind::NotFound),
    (ErrorCode::BucketNotEmpty, ErrorKind::Fatal),
];

const AUTOSCALING_TABLE: &[(ErrorCode, ErrorKind)] = &[
    (ErrorCode::LaunchConfigurationNotFound, ErrorKind::NotFound),
    (ErrorCode::ResourceInUse, ErrorKind::DependencyViolation),
];

const ELB_TABLE: &[(ErrorCode, ErrorKind)] = &[
    (ErrorCode::LoadBalancerNotFound, ErrorKind::NotFound),
    (ErrorCode::InvalidLoadBalancerName, ErrorKind::NotFound),
    (ErrorCode::DependencyViolation, ErrorKind::DependencyViolation),
];

impl Service {
    fn table(&self) -> &'static [(ErrorCode, ErrorKind)] {
        match self {
            Service::Ec2 => EC2_TABLE,
            Service::S3 => S3_TABLE,
            Service::Autoscaling => AUTOSCALING_TABLE,
            Service::Elb => ELB_TABLE,
        }
    }

    /// Classify a code returned by this service
    pub fn classify(&self, code: &ErrorCode) -> ErrorKind {
        self.table()
            .iter()
            .find(|(known, _)| known == code)
            .map(|(_, kind)| *kind)
            .unwrap_or(ErrorKind::Fatal)
    }
}

/// Build a classified [`ApiError`] for a code returned by `service`
pub fn api_error(service: Service, code: &str, message: impl Into<String>) -> ApiError {
    let kind = service.classify(&ErrorCode::parse(code));
    ApiError::new(code, message, kind)
}

/// Configuration errors of the AWS provider
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

impl From<ConfigError> for CloudError {
    fn from(err: ConfigError) -> Self {
        CloudError::InvalidConfig(err.to_string())
    }
}
