// src/bsxml.rs
//
// BehaviorSpace experiment XML: rendering and reading.
//
// The writer emits the `<experiments>` document NetLogo's headless runner
// consumes, encoded by hand the same way the telemetry sink encodes JSON
// lines: the format is small and fixed, so a serializer dependency buys
// nothing. The reader is a single-purpose element parser for the same
// grammar; structural surprises (unexpected tags or attributes) are
// specification errors naming the file and the offending element.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::axis::{AxisError, EnumeratedValues, SteppedValues};
use crate::batch::Batch;
use crate::experiment::Experiment;
use crate::value::Value;

/// Errors from reading or writing experiment XML.
#[derive(Debug)]
pub enum XmlError {
    Io {
        path: String,
        source: std::io::Error,
    },
    /// Not well-formed XML.
    Syntax { file: String, message: String },
    /// Well-formed, but not a BehaviorSpace document.
    Unexpected {
        file: String,
        expected: String,
        found: String,
    },
    /// A steppedValueSet declared an impossible direction.
    Axis { file: String, source: AxisError },
}

impl fmt::Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XmlError::Io { path, source } => {
                write!(f, "error opening file {}: {}", path, source)
            }
            XmlError::Syntax { file, message } => {
                write!(f, "BehaviorSpace XML syntax error in file {}: {}", file, message)
            }
            XmlError::Unexpected {
                file,
                expected,
                found,
            } => write!(
                f,
                "BehaviorSpace XML format error in file {}: expected \"{}\", found \"{}\"",
                file, expected, found
            ),
            XmlError::Axis { file, source } => {
                write!(f, "BehaviorSpace XML format error in file {}: {}", file, source)
            }
        }
    }
}

impl std::error::Error for XmlError {}

/// Escape text for element content and attribute values.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn bool_attr(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

/// Render a full `<experiments>` document.
pub fn render_experiments(experiments: &[Experiment]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<!DOCTYPE experiments SYSTEM \"behaviorspace.dtd\">\n");
    out.push_str("<experiments>\n");
    for e in experiments {
        render_experiment(&mut out, e);
    }
    out.push_str("</experiments>\n");
    out
}

fn render_experiment(out: &mut String, e: &Experiment) {
    out.push_str(&format!(
        "  <experiment name=\"{}\" repetitions=\"{}\" sequentialRunOrder=\"{}\" runMetricsEveryStep=\"{}\">\n",
        escape(&e.name),
        e.repetitions,
        bool_attr(e.sequential_run_order),
        bool_attr(e.run_metrics_every_step),
    ));
    if !e.setup.is_empty() {
        out.push_str(&format!("    <setup>{}</setup>\n", escape(&e.setup)));
    }
    if !e.go.is_empty() {
        out.push_str(&format!("    <go>{}</go>\n", escape(&e.go)));
    }
    if !e.final_code.is_empty() {
        out.push_str(&format!(
            "    <final>\n{}\n    </final>\n",
            escape(&e.final_code)
        ));
    }
    if let Some(limit) = e.time_limit {
        out.push_str(&format!(
            "    <timeLimit steps=\"{}\"/>\n",
            limit.ceil() as u64
        ));
    }
    if let Some(cond) = &e.exit_condition {
        out.push_str(&format!(
            "    <exitCondition>{}</exitCondition>\n",
            escape(cond)
        ));
    }
    for m in &e.metrics {
        out.push_str(&format!("    <metric>{}</metric>\n", escape(m)));
    }
    for s in &e.stepped {
        out.push_str(&format!(
            "    <steppedValueSet variable=\"{}\" first=\"{}\" step=\"{}\" last=\"{}\"/>\n",
            escape(&s.variable),
            s.first,
            s.step,
            s.last
        ));
    }
    for en in &e.enumerated {
        out.push_str(&format!(
            "    <enumeratedValueSet variable=\"{}\">\n",
            escape(&en.variable)
        ));
        for v in &en.values {
            out.push_str(&format!(
                "      <value value=\"{}\"/>\n",
                escape(&v.to_string())
            ));
        }
        out.push_str("    </enumeratedValueSet>\n");
    }
    out.push_str("  </experiment>\n");
}

/// Write one `<experiments>` document. On a write failure the partial
/// file is removed rather than left corrupt.
pub fn write_experiments<P: AsRef<Path>>(
    path: P,
    experiments: &[Experiment],
) -> Result<(), XmlError> {
    let path = path.as_ref();
    let io_err = |e: std::io::Error| XmlError::Io {
        path: path.display().to_string(),
        source: e,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    let result = writer
        .write_all(render_experiments(experiments).as_bytes())
        .and_then(|_| writer.flush());
    if let Err(e) = result {
        let _ = fs::remove_file(path);
        return Err(io_err(e));
    }
    Ok(())
}

/// Write a batch's documents: the experiment list sliced into the batch's
/// document groups, each group as one numbered file. Documents written
/// before a failure remain in place.
pub fn write_documents(
    base: &Path,
    batch: &Batch,
    experiments: &[Experiment],
) -> Result<Vec<String>, XmlError> {
    let mut written = Vec::with_capacity(batch.doc_count());
    for doc in 1..=batch.doc_count() {
        let runs = batch.doc_runs(doc);
        let slice = &experiments[runs.start() - 1..*runs.end()];
        let name = batch.doc_file_name(base, doc);
        write_experiments(&name, slice)?;
        written.push(name);
    }
    Ok(written)
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    file: &'a str,
}

impl<'a> Reader<'a> {
    fn new(text: &'a str, file: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
            file,
        }
    }

    fn syntax(&self, message: impl Into<String>) -> XmlError {
        XmlError::Syntax {
            file: self.file.to_string(),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.bytes[self.pos..].starts_with(s.as_bytes())
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn skip_until(&mut self, marker: &str) -> Result<(), XmlError> {
        while self.pos < self.bytes.len() {
            if self.starts_with(marker) {
                self.pos += marker.len();
                return Ok(());
            }
            self.pos += 1;
        }
        Err(self.syntax(format!("unterminated construct, missing '{}'", marker)))
    }

    /// Skip the XML declaration, DOCTYPE and comments before the root.
    fn skip_prolog(&mut self) -> Result<(), XmlError> {
        loop {
            self.skip_whitespace();
            if self.starts_with("<?") {
                self.skip_until("?>")?;
            } else if self.starts_with("<!--") {
                self.skip_until("-->")?;
            } else if self.starts_with("<!") {
                self.skip_until(">")?;
            } else {
                return Ok(());
            }
        }
    }

    fn read_name(&mut self) -> Result<String, XmlError> {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b':')
        ) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.syntax("expected a name"));
        }
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    fn read_attr_value(&mut self) -> Result<String, XmlError> {
        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(self.syntax("expected a quoted attribute value")),
        };
        self.pos += 1;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                let raw = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
                self.pos += 1;
                return Ok(unescape(&raw));
            }
            self.pos += 1;
        }
        Err(self.syntax("unterminated attribute value"))
    }

    fn read_element(&mut self) -> Result<Element, XmlError> {
        if self.peek() != Some(b'<') {
            return Err(self.syntax("expected '<'"));
        }
        self.pos += 1;
        let name = self.read_name()?;
        let mut element = Element {
            name,
            ..Element::default()
        };

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'/') => {
                    self.pos += 1;
                    if self.peek() != Some(b'>') {
                        return Err(self.syntax("expected '>' after '/'"));
                    }
                    self.pos += 1;
                    return Ok(element);
                }
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let key = self.read_name()?;
                    self.skip_whitespace();
                    if self.peek() != Some(b'=') {
                        return Err(self.syntax(format!("expected '=' after attribute '{}'", key)));
                    }
                    self.pos += 1;
                    self.skip_whitespace();
                    let value = self.read_attr_value()?;
                    element.attrs.push((key, value));
                }
                None => return Err(self.syntax(format!("unterminated <{}> tag", element.name))),
            }
        }

        // Content: text and child elements until the matching close tag.
        let mut text_start = self.pos;
        loop {
            match self.peek() {
                None => {
                    return Err(self.syntax(format!("missing </{}>", element.name)));
                }
                Some(b'<') => {
                    element.text.push_str(&unescape(&String::from_utf8_lossy(
                        &self.bytes[text_start..self.pos],
                    )));
                    if self.starts_with("<!--") {
                        self.skip_until("-->")?;
                    } else if self.starts_with("</") {
                        self.pos += 2;
                        let close = self.read_name()?;
                        if close != element.name {
                            return Err(self.syntax(format!(
                                "mismatched close tag </{}> for <{}>",
                                close, element.name
                            )));
                        }
                        self.skip_whitespace();
                        if self.peek() != Some(b'>') {
                            return Err(self.syntax("expected '>' in close tag"));
                        }
                        self.pos += 1;
                        return Ok(element);
                    } else {
                        element.children.push(self.read_element()?);
                    }
                    text_start = self.pos;
                }
                Some(_) => self.pos += 1,
            }
        }
    }
}

/// Parse an `<experiments>` document (or a model's BehaviorSpace section)
/// into experiments. Empty or whitespace-only input yields an empty list.
pub fn parse_experiments(text: &str, file_name: &str) -> Result<Vec<Experiment>, XmlError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = Reader::new(text, file_name);
    reader.skip_prolog()?;
    let root = reader.read_element()?;

    let unexpected = |expected: &str, found: &str| XmlError::Unexpected {
        file: file_name.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    };

    if root.name != "experiments" {
        return Err(unexpected("experiments", &root.name));
    }

    let mut experiments = Vec::new();
    for exp in &root.children {
        if exp.name != "experiment" {
            return Err(unexpected("experiment", &exp.name));
        }

        let mut name = None;
        let mut repetitions = 1u32;
        let mut sequential_run_order = true;
        let mut run_metrics_every_step = true;
        for (attr, value) in &exp.attrs {
            match attr.as_str() {
                "name" => name = Some(value.clone()),
                "repetitions" => {
                    repetitions = value.parse().map_err(|_| {
                        unexpected("integer repetitions", value)
                    })?;
                }
                "sequentialRunOrder" => sequential_run_order = value == "true",
                "runMetricsEveryStep" => run_metrics_every_step = value == "true",
                other => {
                    return Err(unexpected(
                        "name|repetitions|sequentialRunOrder|runMetricsEveryStep",
                        other,
                    ))
                }
            }
        }
        let name = name.ok_or_else(|| {
            unexpected("name", "no \"name\" attribute for experiment")
        })?;

        let mut e = Experiment::named(&name);
        e.repetitions = repetitions;
        e.sequential_run_order = sequential_run_order;
        e.run_metrics_every_step = run_metrics_every_step;

        for elem in &exp.children {
            match elem.name.as_str() {
                "setup" => e.setup = elem.text.trim().to_string(),
                "go" => e.go = elem.text.trim().to_string(),
                "final" => e.final_code = elem.text.trim().to_string(),
                "timeLimit" => {
                    let steps = elem.attr("steps").ok_or_else(|| {
                        unexpected("steps", "no \"steps\" attribute for timeLimit")
                    })?;
                    e.time_limit = Some(steps.parse().map_err(|_| {
                        unexpected("numeric steps", steps)
                    })?);
                }
                "exitCondition" => e.exit_condition = Some(elem.text.trim().to_string()),
                "metric" => e.add_metric(elem.text.trim(), None),
                "steppedValueSet" => {
                    let attr = |key: &str| {
                        elem.attr(key)
                            .ok_or_else(|| unexpected(key, "missing steppedValueSet attribute"))
                    };
                    let parse_f = |key: &str, raw: &str| {
                        raw.parse::<f64>()
                            .map_err(|_| unexpected(&format!("numeric {}", key), raw))
                    };
                    let variable = attr("variable")?;
                    let first = parse_f("first", attr("first")?)?;
                    let step = parse_f("step", attr("step")?)?;
                    let last = parse_f("last", attr("last")?)?;
                    let stepped = SteppedValues::new(variable, first, step, last).map_err(
                        |source| XmlError::Axis {
                            file: file_name.to_string(),
                            source,
                        },
                    )?;
                    e.stepped.push(stepped);
                }
                "enumeratedValueSet" => {
                    let variable = elem.attr("variable").ok_or_else(|| {
                        unexpected("variable", "missing enumeratedValueSet attribute")
                    })?;
                    let mut values = Vec::new();
                    for v in &elem.children {
                        if v.name != "value" {
                            return Err(unexpected("value", &v.name));
                        }
                        let raw = v
                            .attr("value")
                            .ok_or_else(|| unexpected("value", "missing value attribute"))?;
                        values.push(Value::parse_literal(raw));
                    }
                    e.enumerated.push(EnumeratedValues::new(variable, values));
                }
                other => return Err(unexpected("experiment sub-element", other)),
            }
        }

        experiments.push(e);
    }

    Ok(experiments)
}

/// Read an `<experiments>` document from a file.
pub fn read_experiments<P: AsRef<Path>>(path: P) -> Result<Vec<Experiment>, XmlError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| XmlError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_experiments(&text, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::StopCondition;

    fn sample_experiment() -> Experiment {
        let mut e = Experiment::new("x-1", StopCondition::Ticks(200));
        e.setup = "setup".to_string();
        e.go = "go".to_string();
        e.add_metric("count turtles", None);
        e.stepped
            .push(SteppedValues::new("rate", 0.0, 0.5, 1.0).unwrap());
        e.enumerated.push(EnumeratedValues::new(
            "wrap?",
            vec![Value::Bool(true), Value::Bool(false)],
        ));
        e.enumerated.push(EnumeratedValues::single(
            "label",
            Value::Str("a & b".to_string()),
        ));
        e
    }

    #[test]
    fn test_round_trip() {
        let original = vec![sample_experiment()];
        let xml = render_experiments(&original);
        let parsed = parse_experiments(&xml, "test.xml").unwrap();

        assert_eq!(parsed.len(), 1);
        let p = &parsed[0];
        assert_eq!(p.name, "x-1");
        assert_eq!(p.setup, "setup");
        assert_eq!(p.go, "go");
        assert_eq!(p.time_limit, Some(200.0));
        assert_eq!(p.metrics, vec!["count turtles".to_string()]);
        assert_eq!(p.stepped.len(), 1);
        assert_eq!(p.stepped[0].values(), &[0.0, 0.5, 1.0]);
        assert_eq!(p.enumerated.len(), 2);
        assert_eq!(
            p.enumerated[0].values,
            vec![Value::Bool(true), Value::Bool(false)]
        );
        assert_eq!(
            p.enumerated[1].values,
            vec![Value::Str("a & b".to_string())]
        );
    }

    #[test]
    fn test_escaping() {
        let mut e = Experiment::new("x", StopCondition::Ticks(1));
        e.exit_condition = Some("count turtles < 5 & ticks > 2".to_string());
        let xml = render_experiments(&[e]);
        assert!(xml.contains("count turtles &lt; 5 &amp; ticks &gt; 2"));

        let parsed = parse_experiments(&xml, "t.xml").unwrap();
        assert_eq!(
            parsed[0].exit_condition.as_deref(),
            Some("count turtles < 5 & ticks > 2")
        );
    }

    #[test]
    fn test_empty_section() {
        assert!(parse_experiments("", "m.nlogo").unwrap().is_empty());
        assert!(parse_experiments("  \n ", "m.nlogo").unwrap().is_empty());
    }

    #[test]
    fn test_unexpected_root() {
        let err = parse_experiments("<bogus/>", "m.nlogo").unwrap_err();
        match err {
            XmlError::Unexpected {
                file,
                expected,
                found,
            } => {
                assert_eq!(file, "m.nlogo");
                assert_eq!(expected, "experiments");
                assert_eq!(found, "bogus");
            }
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn test_unexpected_attribute() {
        let xml = "<experiments><experiment name=\"a\" colour=\"red\"></experiment></experiments>";
        assert!(matches!(
            parse_experiments(xml, "m.nlogo"),
            Err(XmlError::Unexpected { .. })
        ));
    }

    #[test]
    fn test_missing_name() {
        let xml = "<experiments><experiment repetitions=\"2\"></experiment></experiments>";
        assert!(matches!(
            parse_experiments(xml, "m.nlogo"),
            Err(XmlError::Unexpected { .. })
        ));
    }

    #[test]
    fn test_bad_stepped_direction_rejected() {
        let xml = "<experiments><experiment name=\"a\">\
                   <steppedValueSet variable=\"v\" first=\"0\" step=\"-1\" last=\"10\"/>\
                   </experiment></experiments>";
        assert!(matches!(
            parse_experiments(xml, "m.nlogo"),
            Err(XmlError::Axis { .. })
        ));
    }

    #[test]
    fn test_parse_with_prolog_and_comments() {
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                   <!DOCTYPE experiments SYSTEM \"behaviorspace.dtd\">\n\
                   <!-- generated -->\n\
                   <experiments>\n\
                   <experiment name=\"e\" repetitions=\"3\">\n\
                   <timeLimit steps=\"100\"/>\n\
                   </experiment>\n\
                   </experiments>\n";
        let parsed = parse_experiments(xml, "m.nlogo").unwrap();
        assert_eq!(parsed[0].name, "e");
        assert_eq!(parsed[0].repetitions, 3);
        assert_eq!(parsed[0].time_limit, Some(100.0));
    }

    #[test]
    fn test_write_documents_split() {
        use crate::batch::Batch;

        let dir = tempfile::tempdir().unwrap();
        let experiments: Vec<Experiment> = (1..=12)
            .map(|i| {
                Experiment::new(
                    &crate::experiment::numbered_name("x", i, 12),
                    StopCondition::Ticks(5),
                )
            })
            .collect();
        let batch = Batch::new(&experiments, 10, 5).unwrap();
        let base = dir.path().join("out.xml");
        let written = write_documents(&base, &batch, &experiments).unwrap();

        assert_eq!(written.len(), 3);
        let counts: Vec<usize> = written
            .iter()
            .map(|p| read_experiments(p).unwrap().len())
            .collect();
        assert_eq!(counts, vec![5, 5, 2]);
        assert!(written[0].ends_with("out-1.xml"));
        assert!(written[2].ends_with("out-3.xml"));
    }
}
