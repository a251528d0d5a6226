//! Built-in template catalog, keyed by locale, group, and name.

const EN_RAG_SYSTEM_PROMPT: &str = concat!(
    "You are an assistant to generate a response for the user.\n",
    "You will be provided by a set of documents associated with the user's query.\n",
    "You have to generate a response based on the documents provided.\n",
    "Ignore the documents that are not related to the user's query.\n",
    "You can apologize to the user if you are not able to generate a response.\n",
    "You have to generate the response in the same language as the user's query.\n",
    "Be polite and respectful to the user.\n",
    "Be precise and concise in your response. Avoid unnecessary information.",
);

const EN_RAG_DOCUMENT_PROMPT: &str = "## Document No: $doc_num\n### Content: $chunk_text";

const EN_RAG_FOOTER_PROMPT: &str = concat!(
    "Based only on the above documents, please generate an answer for the user.\n",
    "## Question:\n",
    "$query\n",
    "\n",
    "## Answer: ",
);

/// Resolve a template by locale, group, and name.
pub(super) fn lookup(locale: &str, group: &str, name: &str) -> Option<&'static str> {
    match (locale, group, name) {
        ("en", "rag", "system_prompt") => Some(EN_RAG_SYSTEM_PROMPT),
        ("en", "rag", "document_prompt") => Some(EN_RAG_DOCUMENT_PROMPT),
        ("en", "rag", "footer_prompt") => Some(EN_RAG_FOOTER_PROMPT),
        _ => None,
    }
}
