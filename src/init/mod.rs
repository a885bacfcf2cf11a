// SPDX-License-Identifier: Apache-2.0

pub mod agent;
pub mod args;
pub mod event_config;
pub mod parse;
pub mod server_list;
pub mod wait;
