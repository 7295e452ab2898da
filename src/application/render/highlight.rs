use comrak::nodes::{AstNode, NodeHtmlBlock, NodeValue};
use once_cell::sync::Lazy;
use syntect::{
    html::{ClassStyle, ClassedHTMLGenerator},
    parsing::{SyntaxReference, SyntaxSet},
    util::LinesWithEndings,
};

use super::{escape_html, types::RenderError};

static SYNTAXES: Lazy<SyntaxSet> = Lazy::new(two_face::syntax::extra_newlines);

/// Class prefix matched by the styles in `r_highlight.html`.
const CLASS_STYLE: ClassStyle = ClassStyle::SpacedPrefixed { prefix: "syntax-" };

/// Replace every fenced block carrying a language with highlighted markup.
pub(crate) fn highlight_code_blocks<'a>(node: &'a AstNode<'a>) -> Result<(), RenderError> {
    if let Some((language, literal)) = fenced_block(node) {
        let html = highlight_code(&language, &literal)?;
        node.data.borrow_mut().value = NodeValue::HtmlBlock(NodeHtmlBlock {
            block_type: 0,
            literal: html,
        });
        return Ok(());
    }

    let mut child = node.first_child();
    while let Some(next) = child {
        highlight_code_blocks(next)?;
        child = next.next_sibling();
    }
    Ok(())
}

pub(crate) fn highlight_code(language: &str, code: &str) -> Result<String, RenderError> {
    let syntax = find_syntax(language).unwrap_or_else(|| SYNTAXES.find_syntax_plain_text());

    let mut code = code.to_string();
    if !code.ends_with('\n') {
        code.push('\n');
    }

    let mut generator = ClassedHTMLGenerator::new_with_class_style(syntax, &SYNTAXES, CLASS_STYLE);
    for line in LinesWithEndings::from(code.as_str()) {
        generator
            .parse_html_for_line_which_includes_newline(line)
            .map_err(|err| RenderError::Highlighting {
                language: language.to_string(),
                message: err.to_string(),
            })?;
    }

    let lang = escape_html(&language.to_ascii_lowercase());
    Ok(format!(
        "<pre class=\"syntax-highlight\"><code class=\"language-{lang}\">{}</code></pre>\n",
        generator.finalize()
    ))
}

fn find_syntax(token: &str) -> Option<&'static SyntaxReference> {
    let lowercase = token.to_ascii_lowercase();
    SYNTAXES
        .find_syntax_by_token(&lowercase)
        .or_else(|| SYNTAXES.find_syntax_by_name(token))
        .or_else(|| SYNTAXES.find_syntax_by_extension(&lowercase))
}

fn fenced_block(node: &AstNode<'_>) -> Option<(String, String)> {
    let data = node.data.borrow();
    let NodeValue::CodeBlock(block) = &data.value else {
        return None;
    };
    let language = block.info.split_whitespace().next()?;
    // knitr writes chunk options as `{r echo=FALSE}`
    let language = language.trim_start_matches('{').trim_end_matches('}');
    (!language.is_empty()).then(|| (language.to_string(), block.literal.clone()))
}
