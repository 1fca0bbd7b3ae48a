/*
 * SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

use std::collections::HashMap;

use mockall::automock;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParameterError {
    #[error("Parameter {name} is not set")]
    NotFound { name: String },
    #[error("Parameter {name} is empty")]
    Empty { name: String },
}

/// Source of deployment specific parameters, e.g. the cloud project to query
#[automock]
pub trait ParameterFetcher: Send + Sync {
    fn get_parameter(&self, name: &str) -> Result<String, ParameterError>;
}

/// Parameters which were provided upfront, e.g. through the configuration file
#[derive(Debug, Clone, Default)]
pub struct StaticParameterFetcher {
    parameters: HashMap<String, String>,
}

impl StaticParameterFetcher {
    pub fn new(parameters: HashMap<String, String>) -> Self {
        Self { parameters }
    }
}

impl ParameterFetcher for StaticParameterFetcher {
    fn get_parameter(&self, name: &str) -> Result<String, ParameterError> {
        self.parameters
            .get(name)
            .cloned()
            .ok_or_else(|| ParameterError::NotFound {
                name: name.to_string(),
            })
    }
}

/// Reads parameters from environment variables.
///
/// The parameter `project-id` with prefix `KV_SHARD_MAPPING` is read from
/// `KV_SHARD_MAPPING_PROJECT_ID`.
#[derive(Debug, Clone)]
pub struct EnvParameterFetcher {
    prefix: String,
}

impl EnvParameterFetcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn variable_name(&self, name: &str) -> String {
        let name = name.replace(['-', '.'], "_").to_ascii_uppercase();
        if self.prefix.is_empty() {
            name
        } else {
            format!("{}_{name}", self.prefix)
        }
    }
}

impl ParameterFetcher for EnvParameterFetcher {
    fn get_parameter(&self, name: &str) -> Result<String, ParameterError> {
        std::env::var(self.variable_name(name)).map_err(|_| ParameterError::NotFound {
            name: name.to_string(),
        })
    }
}

/// Fetches a parameter which must have a non-empty value
pub fn get_required_parameter(
    fetcher: &dyn ParameterFetcher,
    name: &str,
) -> Result<String, ParameterError> {
    let value = fetcher.get_parameter(name)?;
    if value.trim().is_empty() {
        return Err(ParameterError::Empty {
            name: name.to_string(),
        });
    }
    Ok(value)
}
