//! 发给模型的提示词

pub const ANSWER_SYSTEM_PROMPT: &str = r#"You are a master problem solver. You will be given the rendered text of a quiz web page and possibly the content of a linked file (CSV, JSON, text) or one or more images.
Your job is to analyze all the provided information and answer the question asked on the page.

Rules:
- Answer based only on the data provided. Perform any analysis or calculation the question needs.
- If the question asks for a specific value, word or piece of text, copy it exactly as it appears.
- Pay close attention to the answer format the page asks for.

You MUST respond with a single JSON object and nothing else.
- A number: {"answer": 12345}
- Text: {"answer": "some text"}
- A boolean or a JSON object is also allowed as the value of "answer".
- If the question asks you to produce a chart or plot, do not draw it yourself. Respond instead with
  {"chart": {"type": "bar" | "line", "categories": ["..."], "series": [{"name": "...", "values": [1, 2]}], "title": "...", "x_label": "...", "y_label": "..."}}
  where every series has exactly one value per category."#;

pub const ANSWER_FORMAT_REMINDER: &str =
    "\nBased only on the data above, give the final answer as a single JSON object in the required format.";

pub const FEEDBACK_PREFIX: &str =
    "IMPORTANT FEEDBACK ON PREVIOUS ATTEMPT (your last answer was rejected, give a materially different answer):";

pub const LOCATE_RESOURCE_PROMPT: &str = r#"The following text was rendered from a quiz web page. The question refers to a data file or image that must be downloaded to answer it.
Reply with only the URL (absolute or relative to the page) of that primary resource, with no other text.
If no such resource can be identified, reply with exactly NONE.

PAGE TEXT:"#;
