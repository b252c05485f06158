// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the relay server.
#[derive(Debug, Clone, clap::Args)]
pub struct RelayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "PARLEY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9700, env = "PARLEY_PORT")]
    pub port: u16,

    /// Shared secret for verifying connection tokens (HS256).
    #[arg(long, env = "PARLEY_JWT_SECRET")]
    pub jwt_secret: String,
}
