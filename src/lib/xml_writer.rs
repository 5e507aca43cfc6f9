//! Indented XML document writer used by the generator.

use anyhow::{bail, Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Stateful XML emitter with two-space indentation.
///
/// Elements are opened with [`start_element`](Self::start_element) (or the
/// scoped [`element`](Self::element) combinator) and attributes attach to the
/// most recent start tag until its first child or close.  An element closed
/// with no content comes out self-closing.  Dropping the writer closes any
/// elements still open, so an abort mid-document leaves well-formed output.
pub struct XmlWriter<W: Write> {
    inner: Writer<W>,
    stack: Vec<String>,
    pending: Option<BytesStart<'static>>,
    finished: bool,
}

impl XmlWriter<BufWriter<File>> {
    /// Create `path` (truncating any existing file) and emit the XML
    /// declaration.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("cannot create {}", path.display()))?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> XmlWriter<W> {
    /// Wrap any sink and emit the XML declaration.
    pub fn new(writer: W) -> Result<Self> {
        let mut inner = Writer::new_with_indent(writer, b' ', 2);
        inner
            .write_event(Event::Decl(BytesDecl::new("1.0", None, None)))
            .context("writing XML declaration")?;
        Ok(XmlWriter {
            inner,
            stack: Vec::new(),
            pending: None,
            finished: false,
        })
    }

    /// Open `name`.  Attributes may be attached until the first child, text
    /// or close.
    pub fn start_element(&mut self, name: &str) -> Result<()> {
        self.flush_pending()?;
        self.stack.push(name.to_string());
        self.pending = Some(BytesStart::new(name.to_string()));
        Ok(())
    }

    /// Close the innermost open element.
    pub fn end_element(&mut self) -> Result<()> {
        let name = match self.stack.pop() {
            Some(n) => n,
            None => bail!("end_element with no element open"),
        };
        match self.pending.take() {
            // nothing was written inside, emit the short form
            Some(start) => self
                .inner
                .write_event(Event::Empty(start))
                .with_context(|| format!("writing <{}/>", name))?,
            None => self
                .inner
                .write_event(Event::End(BytesEnd::new(name.as_str())))
                .with_context(|| format!("writing </{}>", name))?,
        }
        Ok(())
    }

    /// Scoped element: open `name`, run `body`, close.  The surrounding
    /// [`Drop`] guard closes the element if `body` errors out.
    pub fn element<F>(&mut self, name: &str, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.start_element(name)?;
        body(self)?;
        self.end_element()
    }

    /// Attach `key="value"` to the pending start tag.
    pub fn attribute<V: Display>(&mut self, key: &str, value: V) -> Result<()> {
        match self.pending.as_mut() {
            Some(start) => {
                start.push_attribute((key, value.to_string().as_str()));
                Ok(())
            }
            None => bail!("attribute \"{}\" with no start tag open", key),
        }
    }

    /// Escaped character data inside the current element.
    pub fn text<V: Display>(&mut self, value: V) -> Result<()> {
        if self.stack.is_empty() {
            bail!("text with no element open");
        }
        self.flush_pending()?;
        self.inner
            .write_event(Event::Text(BytesText::new(&value.to_string())))
            .context("writing text")
    }

    /// `<name>value</name>` in one call.
    pub fn single_element<V: Display>(&mut self, name: &str, value: V) -> Result<()> {
        self.start_element(name)?;
        self.text(value)?;
        self.end_element()
    }

    /// `<name/>` inside the current element.
    pub fn empty_element(&mut self, name: &str) -> Result<()> {
        if self.stack.is_empty() {
            bail!("empty_element <{}/> with no element open", name);
        }
        self.flush_pending()?;
        self.inner
            .write_event(Event::Empty(BytesStart::new(name)))
            .with_context(|| format!("writing <{}/>", name))
    }

    /// `<!-- text -->` at the current position, document level included.
    /// The text is written verbatim.
    pub fn comment(&mut self, text: &str) -> Result<()> {
        self.flush_pending()?;
        self.inner
            .write_event(Event::Comment(BytesText::from_escaped(text)))
            .context("writing comment")
    }

    /// Close any elements still open, finalize the document and flush.
    pub fn finish(mut self) -> Result<()> {
        self.close_all()?;
        self.inner
            .get_mut()
            .write_all(b"\n")
            .context("finalizing document")?;
        self.inner.get_mut().flush().context("flushing output")?;
        self.finished = true;
        Ok(())
    }

    fn close_all(&mut self) -> Result<()> {
        while !self.stack.is_empty() {
            self.end_element()?;
        }
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        if let Some(start) = self.pending.take() {
            let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
            self.inner
                .write_event(Event::Start(start))
                .with_context(|| format!("writing <{}>", name))?;
        }
        Ok(())
    }
}

impl<W: Write> Drop for XmlWriter<W> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // best effort, errors already reported on the main path
        if self.close_all().is_ok() {
            let _ = self.inner.get_mut().write_all(b"\n");
        }
        let _ = self.inner.get_mut().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render<F>(body: F) -> String
    where
        F: FnOnce(&mut XmlWriter<&mut Vec<u8>>) -> Result<()>,
    {
        let mut buf = Vec::new();
        let mut w = XmlWriter::new(&mut buf).unwrap();
        body(&mut w).unwrap();
        w.finish().unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn nested_elements_indent() {
        let s = render(|w| {
            w.element("a", |w| {
                w.attribute("x", 1)?;
                w.single_element("b", "hi")?;
                w.element("c", |w| w.attribute("y", "z"))?;
                w.empty_element("d")
            })
        });
        assert_eq!(
            s,
            "<?xml version=\"1.0\"?>\n\
             <a x=\"1\">\n  <b>hi</b>\n  <c y=\"z\"/>\n  <d/>\n</a>\n"
        );
    }

    #[test]
    fn childless_element_is_self_closing() {
        let s = render(|w| w.element("features", |_| Ok(())));
        assert_eq!(s, "<?xml version=\"1.0\"?>\n<features/>\n");
    }

    #[test]
    fn text_and_attributes_are_escaped() {
        let s = render(|w| {
            w.element("a", |w| {
                w.attribute("q", "say \"no\" & <go>")?;
                w.text("x < y & z")
            })
        });
        assert!(s.contains("say &quot;no&quot; &amp; &lt;go&gt;"));
        assert!(s.contains("x &lt; y &amp; z"));
    }

    #[test]
    fn comment_at_document_level() {
        let s = render(|w| {
            w.comment(" hello ")?;
            w.element("a", |_| Ok(()))
        });
        assert_eq!(s, "<?xml version=\"1.0\"?>\n<!-- hello -->\n<a/>\n");
    }

    #[test]
    fn attribute_without_start_tag_is_an_error() {
        let mut buf = Vec::new();
        let mut w = XmlWriter::new(&mut buf).unwrap();
        assert!(w.attribute("k", "v").is_err());
    }

    #[test]
    fn attribute_after_child_is_an_error() {
        let mut buf = Vec::new();
        let mut w = XmlWriter::new(&mut buf).unwrap();
        w.start_element("a").unwrap();
        w.empty_element("b").unwrap();
        assert!(w.attribute("k", "v").is_err());
    }

    #[test]
    fn unbalanced_end_is_an_error() {
        let mut buf = Vec::new();
        let mut w = XmlWriter::new(&mut buf).unwrap();
        assert!(w.end_element().is_err());
        assert!(w.text("dangling").is_err());
        assert!(w.empty_element("x").is_err());
    }

    #[test]
    fn drop_closes_open_elements() {
        let mut buf = Vec::new();
        {
            let mut w = XmlWriter::new(&mut buf).unwrap();
            w.start_element("a").unwrap();
            w.start_element("b").unwrap();
            w.single_element("c", 7).unwrap();
            // simulated abort: writer dropped with two elements open
        }
        let s = String::from_utf8(buf).unwrap();
        assert_eq!(
            s,
            "<?xml version=\"1.0\"?>\n<a>\n  <b>\n    <c>7</c>\n  </b>\n</a>\n"
        );
    }
}
