// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Events that tasks can `wait` on.

pub mod once;
pub mod repeated;
