//! Prompt construction for every extraction path.
//!
//! URL-based and screenshot-based extraction share one JSON contract and the
//! same cleaning rules, so a single builder produces all three variants:
//!
//! | Input | Role given to the model | Image |
//! |-------|-------------------------|-------|
//! | [`PromptInput::Url`] | web content extraction agent | `og:image` → `twitter:image` → largest `<img>` |
//! | [`PromptInput::SingleImage`] | OCR agent, one screenshot | always `null` |
//! | [`PromptInput::ImageSequence`] | OCR agent, scrolling screenshots | always `null` |
//!
//! Output is deterministic for a given input.

use crate::models::EXTRACTION_FAILED_TITLE;

/// What the model is being asked to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptInput<'a> {
    /// Fetch and parse a live page.
    Url(&'a str),
    /// Read one screenshot.
    SingleImage,
    /// Read `n` top-to-bottom screenshots of one page.
    ImageSequence(usize),
}

impl PromptInput<'_> {
    /// Pick the image variant that matches a frame count.
    pub fn for_frames(count: usize) -> PromptInput<'static> {
        if count <= 1 {
            PromptInput::SingleImage
        } else {
            PromptInput::ImageSequence(count)
        }
    }
}

const CLEANING_RULES: &str = "\
    *   Remove all content from navigational elements (`<nav>`), headers (`<header>`), footers (`<footer>`), sidebars (`<aside>`), and pop-ups.
    *   Strip out all scripts, styles, and iframes.
    *   Remove advertisements and common non-content sections like \"Related Articles\", \"Comments\", cookie banners, or social sharing buttons.
    *   Normalize whitespace: replace multiple spaces, newlines, or tabs with a single space.
    *   Trim leading/trailing whitespace from the final result.";

const OCR_CLEANING_RULES: &str = "\
    *   Be meticulous. Exclude any text from advertisements, navigation menus, \"related articles\" sections, cookie banners, or headers/footers.
    *   Combine the extracted paragraphs into a single, coherent string.
    *   Normalize whitespace: replace multiple spaces or newlines with a single space.";

/// Build the extraction prompt for `input`.
pub fn build_prompt(input: PromptInput<'_>) -> String {
    match input {
        PromptInput::Url(url) => url_prompt(url),
        PromptInput::SingleImage => image_prompt(1),
        PromptInput::ImageSequence(count) => image_prompt(count),
    }
}

fn json_contract(image_url_type: &str) -> String {
    format!(
        "{{\n  \"title\": \"string\",\n  \"textContent\": \"string\",\n  \"imageUrl\": {}\n}}",
        image_url_type
    )
}

fn url_prompt(url: &str) -> String {
    format!(
        r#"You are an expert web content extraction agent. Your goal is to visit a URL, analyze its content, and extract the core article information, returning it as a clean JSON object.

URL to analyze: {url}

**Primary Goal:** Extract the main article's title, text content, and primary image.

**Instructions:**

1.  **Analyze the Page**: Access the content at the provided URL. Some pages use client-side rendering; your analysis must account for the fully rendered content.

2.  **Extract Title**:
    *   **Priority 1**: The text inside the first `<h1>` tag.
    *   **Priority 2**: If no `<h1>` exists, the content of the document's `<title>` tag.

3.  **Extract Main Image URL**:
    *   **Priority 1**: The `content` attribute of `<meta property="og:image">`.
    *   **Priority 2**: The `content` attribute of `<meta name="twitter:image">`.
    *   **Priority 3**: The `src` of the largest, most prominent `<img>` that appears to be the main article image.
    *   The final URL must be absolute. If no suitable image is found, use `null`.

4.  **Extract and Clean Text Content**:
    *   Identify the main block of text that constitutes the article body. Use `<article>`, `<main>`, and sub-headings (`<h2>`, `<h3>`) as clues, but focus on the largest contiguous block of paragraph text.
    *   **Aggressively clean the text**:
{rules}

5.  **Output Format**: Return **ONLY** one raw JSON object with the structure below. Do not include any explanatory text or markdown formatting (like ```json).

    **JSON Structure:**
{contract}

6.  **Error Handling**:
    *   If you are blocked from accessing the page (paywall, CAPTCHA, login screen), or the page has no meaningful article content, **do not return nulls**. Return a JSON object whose `title` is "{failed}" and whose `textContent` briefly explains the problem (e.g. "Page requires a login to view content.", "Content is behind a paywall.", "I am unable to directly access and parse the full content of the provided URL."), with `imageUrl` set to `null`.
"#,
        url = url,
        rules = CLEANING_RULES,
        contract = json_contract("\"string | null\""),
        failed = EXTRACTION_FAILED_TITLE,
    )
}

fn image_prompt(count: usize) -> String {
    let (subject, synthesis, title_source, dedupe) = if count <= 1 {
        (
            "the provided screenshot of a news article".to_string(),
            String::new(),
            "the screenshot",
            "",
        )
    } else {
        (
            format!(
                "the {} provided screenshots of a news article, ordered from the top of the page to the bottom",
                count
            ),
            "1.  **Synthesize Content**: Treat the series of images as a single, continuous document. Adjacent screenshots may overlap.\n".to_string(),
            "the first screenshot only",
            "    *   Deduplicate any overlapping text between adjacent screenshots.\n",
        )
    };
    let step = |n: usize| if count <= 1 { n - 1 } else { n };

    format!(
        r#"You are an expert Optical Character Recognition (OCR) and content extraction agent. Your goal is to analyze {subject} and extract its core content.

**Instructions:**

{synthesis}{t}.  **Identify the Title**: Find the largest, most prominent heading-like text at the top of the article in {title_source}.
{b}.  **Extract Body Text**: Read all the paragraphs that form the main body of the article{across}.
{c}.  **Clean the Content**:
{rules}
{dedupe}{o}.  **Output Format**: Return **ONLY** a raw JSON object with the structure below. Do not include any explanatory text or markdown formatting. The `imageUrl` must be `null`.

**JSON Structure:**
{contract}

If the screenshots contain no readable article, return a JSON object whose `title` is "{failed}" and whose `textContent` briefly explains why.
"#,
        subject = subject,
        synthesis = synthesis,
        title_source = title_source,
        across = if count <= 1 { "" } else { " across all screenshots" },
        rules = OCR_CLEANING_RULES,
        dedupe = dedupe,
        contract = json_contract("null"),
        failed = EXTRACTION_FAILED_TITLE,
        t = step(2),
        b = step(3),
        c = step(4),
        o = step(5),
    )
}
