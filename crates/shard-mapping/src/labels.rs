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

/// The instance label that carries the shard an instance serves
pub const SHARD_NUMBER_LABEL: &str = "shard-num";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("Can't find the {key} label")]
    NotFound { key: &'static str },
    #[error("Failed converting {value:?} of label {key} to a shard number: {reason}")]
    InvalidArgument {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Extracts the shard number off the labels of an instance.
///
/// The value must be a non-negative base-10 integer that fits a 32-bit signed
/// integer. Surrounding ASCII whitespace and a leading `+` are tolerated.
/// Whether the shard exists in the current shard space is not checked here.
pub fn shard_number_from_labels(labels: &HashMap<String, String>) -> Result<u32, LabelError> {
    let value = labels.get(SHARD_NUMBER_LABEL).ok_or(LabelError::NotFound {
        key: SHARD_NUMBER_LABEL,
    })?;

    let invalid = |reason: String| LabelError::InvalidArgument {
        key: SHARD_NUMBER_LABEL,
        value: value.clone(),
        reason,
    };

    let shard_num = value
        .trim_ascii()
        .parse::<i32>()
        .map_err(|e| invalid(e.to_string()))?;

    u32::try_from(shard_num).map_err(|_| invalid("shard number is negative".to_string()))
}
