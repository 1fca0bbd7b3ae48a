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

use crate::parameters::ParameterError;

/// Errors that can reach the caller of a cluster mappings manager, either at
/// construction time or out of a discovery cycle.
#[derive(thiserror::Error, Debug)]
pub enum ShardMappingError {
    /// The discovery cycle was cancelled before the instance inventory could
    /// be fetched. No mapping is produced for the cycle.
    #[error("Discovery of {operation} was cancelled")]
    Cancelled { operation: &'static str },

    #[error("Invalid cluster mappings configuration: {0}")]
    Config(String),

    #[error("Failed to fetch required parameter: {0}")]
    Parameter(#[from] ParameterError),
}

impl ShardMappingError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ShardMappingError::Cancelled { .. })
    }
}
