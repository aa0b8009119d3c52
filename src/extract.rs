// src/extract.rs

use crate::date::DateParser;
use crate::error::{Error, Result};
use crate::model::Message;
use scraper::{Html, Selector};
use std::io::BufRead;
use std::path::PathBuf;
use tracing::{debug, warn};

const MESSAGE_START: &[u8] = br#"<div class="message">"#;
const MESSAGE_END: &[u8] = b"</p>";

/// What to do with a message block that cannot be turned into a `Message`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Stop at the first malformed block
    #[default]
    Abort,
    /// Log it and carry on with the next block
    Skip,
}

/// Cuts the raw export into message fragments, one buffered chunk at a time.
///
/// A fragment runs from the message container marker up to and including
/// the first `</p>` after it. Only the current fragment plus the chunk being
/// scanned are held in memory, however the export is split into lines.
pub struct Fragments<R> {
    reader: R,
    buf: Vec<u8>,
    /// Start of the bytes not yet handed out or discarded
    pos: usize,
    /// Where the next marker search resumes
    scan: usize,
    in_fragment: bool,
    eof: bool,
}

impl<R: BufRead> Fragments<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: Vec::new(), pos: 0, scan: 0, in_fragment: false, eof: false }
    }

    fn take_fragment(&mut self) -> Option<String> {
        if !self.in_fragment {
            match find(&self.buf[self.scan..], MESSAGE_START) {
                Some(idx) => {
                    self.pos = self.scan + idx;
                    self.scan = self.pos + MESSAGE_START.len();
                    self.in_fragment = true;
                }
                None => {
                    // Everything but a possible marker prefix can go.
                    let keep = self.buf.len().saturating_sub(MESSAGE_START.len() - 1).max(self.pos);
                    self.pos = keep;
                    self.scan = keep;
                    return None;
                }
            }
        }

        match find(&self.buf[self.scan..], MESSAGE_END) {
            Some(idx) => {
                let end = self.scan + idx + MESSAGE_END.len();
                let fragment = String::from_utf8_lossy(&self.buf[self.pos..end]).into_owned();
                self.pos = end;
                self.scan = end;
                self.in_fragment = false;
                Some(fragment)
            }
            None => {
                self.scan = self
                    .buf
                    .len()
                    .saturating_sub(MESSAGE_END.len() - 1)
                    .max(self.pos + MESSAGE_START.len());
                None
            }
        }
    }

    /// Appends the next chunk of input, dropping the consumed prefix first
    /// when it outweighs what is still live.
    fn fill(&mut self) -> std::io::Result<()> {
        if self.pos > self.buf.len() - self.pos {
            self.buf.drain(..self.pos);
            self.scan -= self.pos;
            self.pos = 0;
        }
        let chunk = self.reader.fill_buf()?;
        if chunk.is_empty() {
            self.eof = true;
            return Ok(());
        }
        let n = chunk.len();
        self.buf.extend_from_slice(chunk);
        self.reader.consume(n);
        Ok(())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

impl<R: BufRead> Iterator for Fragments<R> {
    type Item = std::io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(fragment) = self.take_fragment() {
                return Some(Ok(fragment));
            }
            if self.eof {
                if self.in_fragment {
                    debug!("Dropping unterminated message block at end of input");
                    self.in_fragment = false;
                }
                self.buf.clear();
                self.pos = 0;
                self.scan = 0;
                return None;
            }
            if let Err(e) = self.fill() {
                self.eof = true;
                return Some(Err(e));
            }
        }
    }
}

struct FragmentSelectors {
    user: Selector,
    body: Selector,
    meta: Selector,
}

thread_local! {
    static SELECTORS: FragmentSelectors = FragmentSelectors {
        user: Selector::parse(".user").expect("valid selector"),
        body: Selector::parse("p").expect("valid selector"),
        meta: Selector::parse(".meta").expect("valid selector"),
    };
}

/// Text content of the first element matching `selector`, references decoded.
fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>())
}

/// Turns one fragment into a `Message`. `index` is the fragment's position
/// in the file and only used for error reporting.
pub fn parse_fragment(fragment: &str, index: usize, parser: &DateParser) -> Result<Message> {
    let document = Html::parse_fragment(fragment);

    let (user, message, meta) = SELECTORS.with(|sel| {
        (
            first_text(&document, &sel.user),
            first_text(&document, &sel.body),
            first_text(&document, &sel.meta),
        )
    });
    let user = user.ok_or(Error::Extraction { index, missing: "user element" })?;
    let message = message.ok_or(Error::Extraction { index, missing: "paragraph element" })?;
    let meta = meta.ok_or(Error::Extraction { index, missing: "meta element" })?;
    let created = parser.parse(&meta)?;

    Ok(Message { user, message, created })
}

/// Lazily turns an export into messages, in the order they appear.
pub struct MessageExtractor<'p, R> {
    fragments: Fragments<R>,
    parser: &'p DateParser,
    policy: MalformedPolicy,
    source: PathBuf,
    index: usize,
    skipped: usize,
    failed: bool,
}

impl<'p, R: BufRead> MessageExtractor<'p, R> {
    pub fn new(reader: R, parser: &'p DateParser) -> Self {
        Self {
            fragments: Fragments::new(reader),
            parser,
            policy: MalformedPolicy::default(),
            source: PathBuf::new(),
            index: 0,
            skipped: 0,
            failed: false,
        }
    }

    pub fn with_policy(mut self, policy: MalformedPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Path reported in read errors.
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = source.into();
        self
    }

    /// Number of fragments dropped under `MalformedPolicy::Skip`
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> Iterator for MessageExtractor<'_, R> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let fragment = match self.fragments.next()? {
                Ok(fragment) => fragment,
                Err(source) => {
                    self.failed = true;
                    return Some(Err(Error::io(&self.source, source)));
                }
            };
            let index = self.index;
            self.index += 1;

            match parse_fragment(&fragment, index, self.parser) {
                Ok(message) => return Some(Ok(message)),
                Err(e) if self.policy == MalformedPolicy::Skip => {
                    warn!(index, error = %e, "Skipping malformed message");
                    self.skipped += 1;
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::{BufReader, Cursor};

    const EXPORT: &str = r#"<html><head><title>Conversation</title></head><body>
<div class="thread">
<div class="message"><div class="message_header"><span class="user">Alice</span><span class="meta">Monday, 3 January 2022 at 09:15 UTC</span></div></div><p>hello</p>
<div class="message"><div class="message_header"><span class="user">Bob &amp; co</span><span class="meta">Monday, 3 January 2022 at 10:01 UTC+01</span></div></div><p>  &lt;3 "quoted", with comma  </p>
<div class="message"><div class="message_header"><span class="user">Alice</span>
<span class="meta">Tuesday, 4 January 2022 at 23:59 UTC</span></div></div>
<p>multi
line <b>bold</b> åäö</p>
</div></body></html>
"#;

    fn extract(input: &str, policy: MalformedPolicy) -> Vec<Result<Message>> {
        let parser = DateParser::default();
        MessageExtractor::new(Cursor::new(input), &parser).with_policy(policy).collect()
    }

    #[test]
    fn cuts_fragments_in_source_order() {
        let fragments: Vec<String> = Fragments::new(Cursor::new(EXPORT))
            .collect::<std::io::Result<_>>()
            .unwrap();
        assert_eq!(fragments.len(), 3);
        assert!(fragments
            .iter()
            .all(|f| f.as_bytes().starts_with(MESSAGE_START) && f.as_bytes().ends_with(MESSAGE_END)));
        assert!(fragments[1].contains("Bob"));
    }

    #[test]
    fn extracts_user_body_and_timestamp() {
        let messages: Vec<Message> = extract(EXPORT, MalformedPolicy::Abort)
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(messages.len(), 3);

        assert_eq!(messages[0].user, "Alice");
        assert_eq!(messages[0].message, "hello");
        assert_eq!(messages[0].created.to_rfc3339(), "2022-01-03T09:15:00+00:00");

        assert_eq!(messages[1].user, "Bob & co");
        assert_eq!(messages[1].message, "  <3 \"quoted\", with comma  ");
        assert_eq!(messages[1].created.to_rfc3339(), "2022-01-03T10:01:00+01:00");

        assert_eq!(messages[2].message, "multi\nline bold åäö");
    }

    #[test]
    fn missing_meta_aborts_by_default() {
        let input = r#"<div class="message"><span class="user">Alice</span></div><p>hi</p>
<div class="message"><span class="user">Bob</span><span class="meta">Mon 3 Jan 2022 09:15 UTC</span></div><p>yo</p>"#;
        let results = extract(input, MalformedPolicy::Abort);
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            Err(Error::Extraction { index: 0, missing: "meta element" })
        ));
    }

    #[test]
    fn skip_policy_continues_past_malformed_blocks() {
        let input = r#"<div class="message"><span class="meta">Mon 3 Jan 2022 09:15 UTC</span></div><p>hi</p>
<div class="message"><span class="user">Bob</span><span class="meta">Mon 3 Jan 2022 09:15 NOPE</span></div><p>bad tz</p>
<div class="message"><span class="user">Carol</span><span class="meta">Mon 3 Jan 2022 09:15 UTC</span></div><p>ok</p>"#;
        let parser = DateParser::default();
        let mut extractor =
            MessageExtractor::new(Cursor::new(input), &parser).with_policy(MalformedPolicy::Skip);
        let messages: Vec<Message> = extractor.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].user, "Carol");
        assert_eq!(extractor.skipped(), 2);
    }

    #[test]
    fn unterminated_block_is_ignored() {
        let input = r#"<div class="message"><span class="user">Alice</span><span class="meta">Mon 3 Jan 2022 09:15 UTC</span></div><p>never closed"#;
        assert!(extract(input, MalformedPolicy::Abort).is_empty());
    }

    #[test]
    fn matches_class_tokens_and_ignores_comments() {
        let fragment = r#"<div class="message"><!-- <span class="user">Ghost</span> --><span class='name user'>Dana</span><br/><span class="meta small">Mon 3 Jan 2022 09:15 UTC</span><p data-x="a>b">x &#229; &#xE4;</p>"#;
        let message = parse_fragment(fragment, 0, &DateParser::default()).unwrap();
        assert_eq!(message.user, "Dana");
        assert_eq!(message.message, "x å ä");
    }

    #[test]
    fn decodes_named_character_references() {
        let fragment = r#"<div class="message"><span class="user">Ren&eacute;e</span><span class="meta">Mon 3 Jan 2022 09:15 UTC</span></div><p>caf&eacute; &hellip; it&rsquo;s &amp; &lt;b&gt;</p>"#;
        let message = parse_fragment(fragment, 0, &DateParser::default()).unwrap();
        assert_eq!(message.user, "Renée");
        assert_eq!(message.message, "café … it’s & <b>");
    }

    #[test]
    fn markers_split_across_chunks() {
        let parser = DateParser::default();
        for capacity in [1, 3, 7, 64] {
            let reader = BufReader::with_capacity(capacity, EXPORT.as_bytes());
            let users: Vec<String> = MessageExtractor::new(reader, &parser)
                .map(|m| m.map(|m| m.user))
                .collect::<Result<_>>()
                .unwrap();
            assert_eq!(users, vec!["Alice", "Bob & co", "Alice"], "capacity {capacity}");
        }
    }

    #[test]
    fn single_line_export_stays_bounded() {
        let block = r#"<div class="message"><div class="message_header"><span class="user">@@</span><span class="meta">Mon 3 Jan 2022 09:15 UTC</span></div></div><p>body</p>"#;
        let count = 5_000;
        let mut line = String::from("<html><body><div class=\"thread\">");
        for i in 0..count {
            line.push_str(&block.replace("@@", &format!("user{i}")));
        }
        line.push_str("</div></body></html>\n");

        let capacity = 4096;
        let mut fragments = Fragments::new(BufReader::with_capacity(capacity, line.as_bytes()));
        let mut seen = 0;
        let mut longest = 0;
        let mut peak = 0;
        while let Some(fragment) = fragments.next() {
            let fragment = fragment.unwrap();
            assert!(fragment.contains(&format!(">user{seen}<")));
            longest = longest.max(fragment.len());
            peak = peak.max(fragments.buf.len());
            seen += 1;
        }
        assert_eq!(seen, count);
        assert!(peak <= 3 * (longest + capacity), "buffer grew to {peak} bytes");
    }

    #[test]
    fn long_open_block_is_collected_once_closed() {
        let mut input = String::from(
            r#"<div class="message"><span class="user">Eve</span><span class="meta">Mon 3 Jan 2022 09:15 UTC</span></div><p>"#,
        );
        for _ in 0..20_000 {
            input.push_str("line\n");
        }
        input.push_str("</p>");

        let parser = DateParser::default();
        let messages: Vec<Message> = MessageExtractor::new(BufReader::with_capacity(512, input.as_bytes()), &parser)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message.lines().count(), 20_000);
    }
}
