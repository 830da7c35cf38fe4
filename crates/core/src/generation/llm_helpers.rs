//! # LLM Helpers
//!
//! Provider dispatch for radkit clients, written once and shared by the
//! function-style and worker-style call macros.

/// Build the radkit client for `$config.provider` and evaluate `$body` with
/// it bound to `$llm`. API keys come from the environment.
#[macro_export]
macro_rules! with_provider_llm {
    ($config:expr, $llm:ident => $body:expr) => {{
        use radkit::models::providers::{
            AnthropicLlm, DeepSeekLlm, GeminiLlm, GrokLlm, OpenAILlm, OpenRouterLlm,
        };
        use $crate::models::LlmProvider;

        let config: &$crate::models::ModelConfig = $config;
        match config.provider {
            LlmProvider::Anthropic => {
                let $llm = AnthropicLlm::from_env(&config.model)?;
                $body
            }
            LlmProvider::OpenAI => {
                let mut $llm = OpenAILlm::from_env(&config.model)?;
                if let Some(base_url) = &config.base_url {
                    $llm = $llm.with_base_url(base_url);
                }
                $body
            }
            LlmProvider::Gemini => {
                let $llm = GeminiLlm::from_env(&config.model)?;
                $body
            }
            LlmProvider::OpenRouter => {
                let $llm = OpenRouterLlm::from_env(&config.model)?;
                $body
            }
            LlmProvider::Grok => {
                let $llm = GrokLlm::from_env(&config.model)?;
                $body
            }
            LlmProvider::DeepSeek => {
                let $llm = DeepSeekLlm::from_env(&config.model)?;
                $body
            }
        }
    }};
}

/// Run a single structured-output LLM call.
#[macro_export]
macro_rules! run_llm_function {
    ($config:expr, $output_type:ty, $system_prompt:expr, $input:expr) => {{
        use radkit::agent::LlmFunction;

        let result: anyhow::Result<$output_type> = $crate::with_provider_llm!($config, llm => {
            let func =
                LlmFunction::<$output_type>::new_with_system_instructions(llm, $system_prompt);
            func.run($input).await.map_err(Into::into)
        });
        result
    }};
}

/// Run an LLM worker that may call the given tools before answering.
#[macro_export]
macro_rules! run_llm_worker {
    ($config:expr, $output_type:ty, $system_prompt:expr, $input:expr, $($tool:expr),* $(,)?) => {{
        use radkit::agent::LlmWorker;

        let result: anyhow::Result<$output_type> = $crate::with_provider_llm!($config, llm => {
            let worker = LlmWorker::<$output_type>::builder(llm)
                .with_system_instructions($system_prompt)
                $(.with_tool($tool))*
                .build();
            worker.run($input).await.map_err(Into::into)
        });
        result
    }};
}
