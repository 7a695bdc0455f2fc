// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A set of common traits used across the engine.

use async_trait::async_trait;

use crate::types::SimResult;

/// The `Runnable` trait is implemented by long-running simulation components.
///
/// Once a component is [registered](crate::engine::Engine::register) with the
/// engine its `run` function is spawned as a task.
#[async_trait(?Send)]
pub trait Runnable {
    async fn run(&self) -> SimResult {
        Ok(())
    }
}
