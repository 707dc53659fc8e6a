/// Revision label of the table below.
pub const REVISION: &str = "2025-01";

/// (model, input per 1K tokens, output per 1K tokens), in picker order.
pub const MODELS: &[(&str, f64, f64)] = &[
    // OpenAI
    ("GPT-4o", 0.0025, 0.01),
    ("GPT-4o mini", 0.00015, 0.0006),
    ("GPT-3.5 Turbo", 0.0005, 0.0015),
    ("GPT-3.5 Turbo Instruct", 0.0015, 0.002),
    // Anthropic
    ("Claude 3.5 Sonnet", 0.003, 0.015),
    ("Claude 3.5 Haiku", 0.001, 0.005),
    ("Claude 3 Opus", 0.015, 0.075),
    ("Claude 3 Sonnet", 0.003, 0.015),
    ("Claude 3 Haiku", 0.00025, 0.00125),
    // Google
    ("Gemini 2.5 Flash", 0.00001875, 0.000075),
    ("Gemini 2.0 Flash", 0.00001315, 0.0000526),
    ("Gemini 1.5 Pro", 0.00125, 0.005),
    ("Gemini 1.5 Flash", 0.000075, 0.0003),
    ("Gemini 1.0 Pro", 0.0005, 0.0015),
    // Meta
    ("Llama 3.1 405B", 0.0027, 0.0027),
    ("Llama 3.1 70B", 0.00088, 0.00088),
    ("Llama 3.1 8B", 0.00018, 0.00018),
    ("Llama 3 70B", 0.00088, 0.00088),
    ("Llama 3 8B", 0.00018, 0.00018),
    ("Llama 2 70B", 0.0007, 0.0008),
    ("Llama 2 13B", 0.00022, 0.00022),
    ("Llama 2 7B", 0.00015, 0.00015),
    // Mistral
    ("Mistral Large", 0.004, 0.012),
    ("Mistral Medium", 0.0027, 0.0081),
    ("Mistral Small", 0.001, 0.003),
    ("Mistral 7B", 0.00015, 0.00015),
    ("Mixtral 8x7B", 0.00024, 0.00024),
    ("Mixtral 8x22B", 0.00065, 0.00065),
    // Cohere
    ("Command R+", 0.003, 0.015),
    ("Command R", 0.0005, 0.0015),
    ("Command", 0.001, 0.002),
    ("Command Light", 0.0003, 0.0006),
    // Hosted open-weight models
    ("Perplexity Llama 3.1 70B", 0.001, 0.001),
    ("Perplexity Llama 3.1 8B", 0.0002, 0.0002),
    ("Perplexity Mixtral 8x7B", 0.0006, 0.0006),
    ("Together Llama 3.1 405B", 0.005, 0.005),
    ("Together Llama 3.1 70B", 0.0009, 0.0009),
    ("Together Llama 3.1 8B", 0.0002, 0.0002),
    ("Together Mixtral 8x22B", 0.0012, 0.0012),
    ("Groq Llama 3.1 70B", 0.00059, 0.00079),
    ("Groq Llama 3.1 8B", 0.00005, 0.00008),
    ("Groq Mixtral 8x7B", 0.00024, 0.00024),
    ("Groq Gemma 7B", 0.00007, 0.00007),
    ("Fireworks Llama 3.1 405B", 0.003, 0.003),
    ("Fireworks Llama 3.1 70B", 0.0009, 0.0009),
    ("Fireworks Llama 3.1 8B", 0.0002, 0.0002),
    ("Fireworks Mixtral 8x22B", 0.0009, 0.0009),
    ("Replicate Llama 3.1 405B", 0.00095, 0.00095),
    ("Replicate Llama 3.1 70B", 0.00065, 0.00065),
    ("Replicate Llama 3.1 8B", 0.00005, 0.00005),
    // xAI
    ("Grok Beta", 0.005, 0.015),
    ("Grok 2", 0.002, 0.01),
    // AI21
    ("Jurassic-2 Ultra", 0.0188, 0.0188),
    ("Jurassic-2 Mid", 0.0125, 0.0125),
    ("Jurassic-2 Light", 0.0031, 0.0031),
    // Amazon
    ("Amazon Titan Express", 0.0002, 0.0006),
    ("Amazon Titan Lite", 0.00015, 0.0002),
];
