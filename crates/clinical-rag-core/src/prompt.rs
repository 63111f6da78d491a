//! Prompt text for grounded clinical answers.

/// System message sent with every generation request.
pub const SYSTEM_PROMPT: &str = "You are a careful medical information assistant. \
You answer strictly from the clinical evidence supplied in each request and always cite it.";

/// Build the user prompt: rules, then the labeled evidence, then the question.
///
/// `context` is the rendered evidence (`[Source i: ...]` blocks). The query is
/// placed last so the model reads it after the evidence.
pub fn answer_prompt(context: &str, query: &str) -> String {
    format!(
        "Answer the clinical question using the evidence below.\n\
         \n\
         Rules (non-negotiable):\n\
         - Use ONLY the information in the evidence section.\n\
         - If the evidence does not contain enough information to answer, say so plainly.\n\
         - Cite every claim with its label in the form [Source N].\n\
         - Do not add medical knowledge that is not in the evidence.\n\
         - Be concise and factual.\n\
         \n\
         Evidence:\n\
         {context}\n\
         \n\
         Question: {query}\n\
         \n\
         Answer:"
    )
}
