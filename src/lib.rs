// Copyright 2026 The Gantry Authors
// SPDX-License-Identifier: Apache-2.0

pub mod agent;
pub mod config;
pub mod gateway;
pub mod message;
pub mod provider;
pub mod server;
pub mod stream;
pub mod tools;
pub mod transport;
