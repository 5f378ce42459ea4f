//! Prompt building for the refinement call. The wording here is owned by
//! this module; the response contract (one JSON object, candidate under a
//! recognized key) is owned by `queryfit_llm`.

pub const REFINE_SYSTEM_PROMPT: &str = "You are an SEO and content editor. \
Improve the given text with small touches so it answers the user query better. \
Edit-size policy by section: h1/h2 become a headline that answers the query \
directly; p/div may grow by 5-10 words; li by 1-2 words. Preserve the meaning, \
add no marketing cliches. Respond with valid JSON only.";

pub fn build_refine_prompt(
    query: &str,
    current_text: &str,
    markup_context: &str,
    prior_score: f32,
) -> String {
    format!(
        "Input:\n\
         Query: \"{query}\"\n\
         Current text: \"{current_text}\"\n\
         HTML section: \"{markup_context}\"\n\
         Previous score: {prior_score:.4}\n\
         \n\
         Expected output (JSON):\n\
         {{\n\
           \"improved_text\": \"the improved version goes here\"\n\
         }}"
    )
}
