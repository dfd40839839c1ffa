//! XML tokenizer using logos
//!
//! Markup is recognised whole (a start tag with all its attributes is one
//! token); [`parse_start_tag`] then splits the tag apart.

use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq, Eq)]
pub enum XmlToken<'src> {
    #[regex(r"<\?([^?]|\?[^>])*\?>")]
    ProcessingInstruction,

    #[regex(r"<!--([^-]|-[^-])*-->")]
    Comment,

    #[regex(r"<!DOCTYPE[^>]*>")]
    Doctype,

    #[regex(r"<!\[CDATA\[([^\]]|\][^\]]|\]\][^>])*\]\]>", |lex| {
        let s = lex.slice();
        &s[9..s.len() - 3]
    })]
    CData(&'src str),

    #[regex(r"</[A-Za-z_][A-Za-z0-9_.:-]*[ \t\r\n]*>", |lex| {
        let s = lex.slice();
        s[2..s.len() - 1].trim_end()
    })]
    EndTag(&'src str),

    #[regex(r#"<[A-Za-z_][A-Za-z0-9_.:-]*([ \t\r\n]+[A-Za-z_][A-Za-z0-9_.:-]*[ \t\r\n]*=[ \t\r\n]*("[^"]*"|'[^']*'))*[ \t\r\n]*/?>"#, |lex| lex.slice())]
    StartTag(&'src str),

    #[regex(r"[^<]+", |lex| lex.slice())]
    Text(&'src str),
}

/// Tokenize source, keeping byte spans. Unrecognised input is reported as
/// `Err(position)`.
pub fn tokenize(source: &str) -> Vec<Result<(XmlToken<'_>, std::ops::Range<usize>), usize>> {
    XmlToken::lexer(source)
        .spanned()
        .map(|(result, span)| result.map(|token| (token, span.clone())).map_err(|_| span.start))
        .collect()
}

/// Parsed pieces of a start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag<'src> {
    pub name: &'src str,
    pub attributes: Vec<(&'src str, &'src str)>,
    pub self_closing: bool,
}

/// Split a start tag token (`<name a="1" b='2'/>`) into its parts. The
/// token has already been validated by the lexer.
pub fn parse_start_tag(tag: &str) -> StartTag<'_> {
    let self_closing = tag.ends_with("/>");
    let inner = &tag[1..tag.len() - if self_closing { 2 } else { 1 }];
    let name_end = inner
        .find(|c: char| c.is_ascii_whitespace())
        .unwrap_or(inner.len());
    let name = &inner[..name_end];

    let mut attributes = Vec::new();
    let mut rest = inner[name_end..].trim_start();
    while let Some(eq) = rest.find('=') {
        let attr_name = rest[..eq].trim_end();
        let after = rest[eq + 1..].trim_start();
        let quote = match after.chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => break,
        };
        let value_end = match after[1..].find(quote) {
            Some(end) => end + 1,
            None => break,
        };
        attributes.push((attr_name, &after[1..value_end]));
        rest = after[value_end + 1..].trim_start();
    }

    StartTag {
        name,
        attributes,
        self_closing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<XmlToken<'_>> {
        tokenize(source).into_iter().filter_map(|r| r.ok()).map(|(t, _)| t).collect()
    }

    #[test]
    fn test_tokenize_markup() {
        let tokens = kinds(r#"<?xml version="1.0"?><doc a="1"><!-- x --><p/>hi</doc>"#);
        assert_eq!(tokens[0], XmlToken::ProcessingInstruction);
        assert_eq!(tokens[1], XmlToken::StartTag(r#"<doc a="1">"#));
        assert_eq!(tokens[2], XmlToken::Comment);
        assert_eq!(tokens[3], XmlToken::StartTag("<p/>"));
        assert_eq!(tokens[4], XmlToken::Text("hi"));
        assert_eq!(tokens[5], XmlToken::EndTag("doc"));
    }

    #[test]
    fn test_cdata() {
        let tokens = kinds("<a><![CDATA[x < y]]></a>");
        assert_eq!(tokens[1], XmlToken::CData("x < y"));
    }

    #[test]
    fn test_parse_start_tag() {
        let tag = parse_start_tag(r#"<tei:p rend="a b" xml:id='p1'/>"#);
        assert_eq!(tag.name, "tei:p");
        assert_eq!(tag.attributes, vec![("rend", "a b"), ("xml:id", "p1")]);
        assert!(tag.self_closing);
    }
}
