//! Command line and environment configuration.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use ghidra_assistant_core::tool::UnknownToolPolicy;
use ghidra_assistant_core::{DEFAULT_TURN_BUDGET, RetryPolicy};
use ghidra_assistant_openai_model::{OpenAIConfig, OpenAIConfigBuilder};

/// Chat with a model about binaries analyzed by a Ghidra backend.
///
/// Every option can also be set through the environment variable shown in
/// its help.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about)]
pub struct Config {
    /// Base URL of the OpenAI-compatible chat-completions API.
    #[arg(long, env = "API_BASE", default_value = "https://api.openai.com/v1")]
    pub api_base: String,

    /// API key sent to the model API.
    #[arg(long, env = "API_KEY", default_value = "not-used", hide_env_values = true)]
    pub api_key: String,

    /// Model to chat with.
    #[arg(long, env = "MODEL_NAME")]
    pub model_name: String,

    /// Base URL of the analysis backend.
    #[arg(long, env = "GHIDRA_API_BASE", default_value = "http://localhost:9090")]
    pub ghidra_api_base: String,

    /// Address the HTTP server listens on.
    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:5000")]
    pub listen: SocketAddr,

    /// Maximum number of tool turns per conversation.
    #[arg(long, env = "TURN_BUDGET", default_value_t = DEFAULT_TURN_BUDGET)]
    pub turn_budget: usize,

    /// Attempts made while the model API is unreachable.
    #[arg(long, env = "RETRY_ATTEMPTS", default_value_t = 3)]
    pub retry_attempts: u32,

    /// Seconds to wait between two attempts.
    #[arg(long, env = "RETRY_DELAY_SECS", default_value_t = 2)]
    pub retry_delay_secs: u64,

    /// Seconds allowed for connecting to the model API.
    #[arg(long, env = "MODEL_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub model_connect_timeout_secs: u64,

    /// Seconds the model API may stay silent before a request is dropped.
    #[arg(long, env = "MODEL_READ_TIMEOUT_SECS", default_value_t = 120)]
    pub model_read_timeout_secs: u64,

    /// Seconds allowed for a single call to the analysis backend.
    #[arg(long, env = "TOOL_TIMEOUT_SECS", default_value_t = 60)]
    pub tool_timeout_secs: u64,

    /// Answer calls to unknown tools with an error instead of dropping them.
    #[arg(long, env = "ANSWER_UNKNOWN_TOOLS")]
    pub answer_unknown_tools: bool,

    /// Run the tool calls of one model response concurrently.
    #[arg(long, env = "PARALLEL_TOOL_CALLS")]
    pub parallel_tool_calls: bool,
}

impl Config {
    /// Returns the configuration of the model provider.
    pub fn openai_config(&self) -> OpenAIConfig {
        OpenAIConfigBuilder::with_api_key(&self.api_key)
            .with_base_url(&self.api_base)
            .with_model(&self.model_name)
            .with_connect_timeout(Duration::from_secs(
                self.model_connect_timeout_secs,
            ))
            .with_read_timeout(Duration::from_secs(self.model_read_timeout_secs))
            .build()
    }

    /// Returns the retry policy of tool-enabled model requests.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    /// Returns the timeout of a single analysis backend call.
    #[inline]
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Returns how calls to unknown tools are handled.
    pub fn unknown_tool_policy(&self) -> UnknownToolPolicy {
        if self.answer_unknown_tools {
            UnknownToolPolicy::Answer
        } else {
            UnknownToolPolicy::Skip
        }
    }
}
