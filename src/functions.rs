// https://www.w3.org/TR/1999/REC-xpath-19991116/#corelib
//
// The XPath 1.0 core function library plus the `ends-with` and
// `matches` extensions. Functions receive their arguments already
// evaluated; `position`, `last` and the defaulting string functions
// read the context directly. Lookup ignores any namespace prefix on
// the call — only the local name selects the implementation.

use std::collections::HashMap;

use regex::RegexBuilder;

use crate::context::Context;
use crate::dom::{Node, NodeKind};
use crate::result::{Error, Result};
use crate::value::{parse_number, round_half_up, NodeSet, Value};

pub type XPathFn = for<'d> fn(&Context<'d>, Vec<Value<'d>>) -> Result<Value<'d>>;

/// Core functions whose result type is numeric; the positional
/// predicate detector treats a call to any of these as positional.
pub static NUMBER_FUNCTIONS: [&str; 9] = [
    "last",
    "position",
    "count",
    "string-length",
    "number",
    "sum",
    "floor",
    "ceiling",
    "round",
];

pub fn local_function_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Name-indexed function table. Contexts share one instance; custom
/// functions can be registered before evaluation starts.
pub struct FunctionLibrary {
    table: HashMap<&'static str, XPathFn>,
}

impl FunctionLibrary {
    pub fn core() -> Self {
        let mut lib = FunctionLibrary {
            table: HashMap::new(),
        };

        lib.register("last", fn_last);
        lib.register("position", fn_position);
        lib.register("count", fn_count);
        lib.register("id", fn_id);
        lib.register("local-name", fn_local_name);
        lib.register("namespace-uri", fn_namespace_uri);
        lib.register("name", fn_name);
        lib.register("string", fn_string);
        lib.register("concat", fn_concat);
        lib.register("starts-with", fn_starts_with);
        lib.register("contains", fn_contains);
        lib.register("substring-before", fn_substring_before);
        lib.register("substring-after", fn_substring_after);
        lib.register("substring", fn_substring);
        lib.register("string-length", fn_string_length);
        lib.register("normalize-space", fn_normalize_space);
        lib.register("translate", fn_translate);
        lib.register("boolean", fn_boolean);
        lib.register("not", fn_not);
        lib.register("true", fn_true);
        lib.register("false", fn_false);
        lib.register("lang", fn_lang);
        lib.register("number", fn_number);
        lib.register("sum", fn_sum);
        lib.register("floor", fn_floor);
        lib.register("ceiling", fn_ceiling);
        lib.register("round", fn_round);
        lib.register("ends-with", fn_ends_with);
        lib.register("matches", fn_matches);

        lib
    }

    pub fn register(&mut self, name: &'static str, function: XPathFn) {
        self.table.insert(name, function);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(local_function_name(name))
    }

    pub fn call<'d>(
        &self,
        name: &str,
        ctx: &Context<'d>,
        args: Vec<Value<'d>>,
    ) -> Result<Value<'d>> {
        let function = self
            .table
            .get(local_function_name(name))
            .ok_or_else(|| Error::UnknownFunction(name.to_string()))?;
        function(ctx, args)
    }
}

fn check_arity(
    function: &'static str,
    expected: &'static str,
    ok: bool,
    got: usize,
) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(Error::Arity {
            function,
            expected,
            got,
        })
    }
}

fn node_set_arg<'d>(
    function: &'static str,
    value: &Value<'d>,
) -> Result<NodeSet<'d>> {
    value
        .as_node_set()
        .cloned()
        .ok_or(Error::NodeSetExpected { function })
}

/// Optional node-set argument: the functions taking `node-set?` operate
/// on the first node in document order, or the context node when the
/// argument is omitted.
fn optional_target<'d>(
    function: &'static str,
    ctx: &Context<'d>,
    args: &[Value<'d>],
) -> Result<Option<Node<'d>>> {
    match args.first() {
        None => Ok(ctx.node()),
        Some(value) => Ok(node_set_arg(function, value)?.first_in_document_order()),
    }
}

// Node-set functions

fn fn_last<'d>(ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("last", "0", args.is_empty(), args.len())?;
    Ok(Value::Number(ctx.size() as f64))
}

fn fn_position<'d>(ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("position", "0", args.is_empty(), args.len())?;
    Ok(Value::Number(ctx.position() as f64))
}

fn fn_count<'d>(_ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("count", "1", args.len() == 1, args.len())?;
    let set = node_set_arg("count", &args[0])?;
    Ok(Value::Number(set.len() as f64))
}

fn fn_id<'d>(ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("id", "1", args.len() == 1, args.len())?;

    let mut wanted: Vec<String> = Vec::new();
    match &args[0] {
        Value::NodeSet(set) => {
            for node in set.iter() {
                wanted.extend(node.string_value().split_whitespace().map(str::to_string));
            }
        }
        other => {
            wanted.extend(other.string_value().split_whitespace().map(str::to_string));
        }
    }

    let mut found = NodeSet::new();
    if let Some(current) = ctx.node() {
        let doc = current.document();
        for id in 0..doc.node_count() {
            let Some(node) = doc.node(id) else { continue };
            if node.kind() != NodeKind::Element {
                continue;
            }
            let matches = node.attributes().any(|a| {
                a.local_name() == "id"
                    && wanted.iter().any(|w| w.as_str() == a.node_value().unwrap_or(""))
            });
            if matches {
                found.push(node);
            }
        }
    }

    Ok(Value::NodeSet(found))
}

fn fn_local_name<'d>(ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("local-name", "0 or 1", args.len() <= 1, args.len())?;
    let target = optional_target("local-name", ctx, &args)?;
    Ok(Value::String(
        target.map(|n| n.local_name().to_string()).unwrap_or_default(),
    ))
}

fn fn_namespace_uri<'d>(ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("namespace-uri", "0 or 1", args.len() <= 1, args.len())?;
    let target = optional_target("namespace-uri", ctx, &args)?;
    Ok(Value::String(
        target
            .and_then(|n| n.namespace_uri().map(str::to_string))
            .unwrap_or_default(),
    ))
}

fn fn_name<'d>(ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("name", "0 or 1", args.len() <= 1, args.len())?;
    let target = optional_target("name", ctx, &args)?;
    Ok(Value::String(
        target.map(|n| n.qualified_name()).unwrap_or_default(),
    ))
}

// String functions

fn fn_string<'d>(ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("string", "0 or 1", args.len() <= 1, args.len())?;
    let s = match args.first() {
        Some(value) => value.string_value(),
        None => ctx.node().map(|n| n.string_value()).unwrap_or_default(),
    };
    Ok(Value::String(s))
}

fn fn_concat<'d>(_ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("concat", "2 or more", args.len() >= 2, args.len())?;
    let mut out = String::new();
    for value in &args {
        out.push_str(&value.string_value());
    }
    Ok(Value::String(out))
}

fn fn_starts_with<'d>(_ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("starts-with", "2", args.len() == 2, args.len())?;
    let haystack = args[0].string_value();
    let prefix = args[1].string_value();
    Ok(Value::Boolean(haystack.starts_with(&prefix)))
}

fn fn_ends_with<'d>(_ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("ends-with", "2", args.len() == 2, args.len())?;
    let haystack = args[0].string_value();
    let suffix = args[1].string_value();
    Ok(Value::Boolean(haystack.ends_with(&suffix)))
}

fn fn_contains<'d>(_ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("contains", "2", args.len() == 2, args.len())?;
    let haystack = args[0].string_value();
    let needle = args[1].string_value();
    Ok(Value::Boolean(haystack.contains(&needle)))
}

fn fn_substring_before<'d>(
    _ctx: &Context<'d>,
    args: Vec<Value<'d>>,
) -> Result<Value<'d>> {
    check_arity("substring-before", "2", args.len() == 2, args.len())?;
    let haystack = args[0].string_value();
    let needle = args[1].string_value();
    let found = haystack.find(&needle).map(|i| haystack[..i].to_string());
    Ok(Value::String(found.unwrap_or_default()))
}

fn fn_substring_after<'d>(
    _ctx: &Context<'d>,
    args: Vec<Value<'d>>,
) -> Result<Value<'d>> {
    check_arity("substring-after", "2", args.len() == 2, args.len())?;
    let haystack = args[0].string_value();
    let needle = args[1].string_value();
    let found = haystack
        .find(&needle)
        .map(|i| haystack[i + needle.len()..].to_string());
    Ok(Value::String(found.unwrap_or_default()))
}

/// https://www.w3.org/TR/1999/REC-xpath-19991116/#function-substring
///
/// Positions are 1-based and compared after XPath rounding, so a
/// character at position `p` is kept iff `p >= round(start)` and
/// `p < round(start) + round(length)`. NaN bounds keep nothing and an
/// infinite length (`1 div 0`) extends to the end of the string.
fn fn_substring<'d>(_ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity(
        "substring",
        "2 or 3",
        args.len() == 2 || args.len() == 3,
        args.len(),
    )?;

    let s = args[0].string_value();
    let start = round_half_up(args[1].number_value());
    let end = match args.get(2) {
        Some(length) => start + round_half_up(length.number_value()),
        None => f64::INFINITY,
    };

    let out = s
        .chars()
        .enumerate()
        .filter(|(i, _)| {
            let position = (i + 1) as f64;
            position >= start && position < end
        })
        .map(|(_, c)| c)
        .collect();

    Ok(Value::String(out))
}

fn fn_string_length<'d>(ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("string-length", "0 or 1", args.len() <= 1, args.len())?;
    let s = match args.first() {
        Some(value) => value.string_value(),
        None => ctx.node().map(|n| n.string_value()).unwrap_or_default(),
    };
    Ok(Value::Number(s.chars().count() as f64))
}

fn fn_normalize_space<'d>(ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("normalize-space", "0 or 1", args.len() <= 1, args.len())?;
    let s = match args.first() {
        Some(value) => value.string_value(),
        None => ctx.node().map(|n| n.string_value()).unwrap_or_default(),
    };
    let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(Value::String(normalized))
}

fn fn_translate<'d>(_ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("translate", "3", args.len() == 3, args.len())?;
    let s = args[0].string_value();
    let from: Vec<char> = args[1].string_value().chars().collect();
    let to: Vec<char> = args[2].string_value().chars().collect();

    let out = s
        .chars()
        .filter_map(|c| match from.iter().position(|&f| f == c) {
            // Mapped when a replacement exists, dropped when `to` is
            // shorter than `from`.
            Some(i) => to.get(i).copied(),
            None => Some(c),
        })
        .collect();

    Ok(Value::String(out))
}

// Boolean functions

fn fn_boolean<'d>(_ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("boolean", "1", args.len() == 1, args.len())?;
    Ok(Value::Boolean(args[0].boolean_value()))
}

fn fn_not<'d>(_ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("not", "1", args.len() == 1, args.len())?;
    Ok(Value::Boolean(!args[0].boolean_value()))
}

fn fn_true<'d>(_ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("true", "0", args.is_empty(), args.len())?;
    Ok(Value::Boolean(true))
}

fn fn_false<'d>(_ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("false", "0", args.is_empty(), args.len())?;
    Ok(Value::Boolean(false))
}

fn fn_lang<'d>(ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("lang", "1", args.len() == 1, args.len())?;
    let wanted = args[0].string_value().to_ascii_lowercase();

    let mut current = ctx.node();
    while let Some(node) = current {
        let lang_attr = node
            .attributes()
            .find(|a| a.prefix() == Some("xml") && a.local_name() == "lang");
        if let Some(attr) = lang_attr {
            let lang = attr.node_value().unwrap_or("").to_ascii_lowercase();
            let matches =
                lang == wanted || lang.split('-').next() == Some(wanted.as_str());
            return Ok(Value::Boolean(matches));
        }
        current = node.parent();
    }

    Ok(Value::Boolean(false))
}

// Number functions

fn fn_number<'d>(ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("number", "0 or 1", args.len() <= 1, args.len())?;
    let n = match args.first() {
        Some(value) => value.number_value(),
        None => ctx
            .node()
            .map(|node| parse_number(&node.string_value()))
            .unwrap_or(f64::NAN),
    };
    Ok(Value::Number(n))
}

fn fn_sum<'d>(_ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("sum", "1", args.len() == 1, args.len())?;
    let set = node_set_arg("sum", &args[0])?;
    let total = set.iter().map(|n| parse_number(&n.string_value())).sum();
    Ok(Value::Number(total))
}

fn fn_floor<'d>(_ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("floor", "1", args.len() == 1, args.len())?;
    Ok(Value::Number(args[0].number_value().floor()))
}

fn fn_ceiling<'d>(_ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("ceiling", "1", args.len() == 1, args.len())?;
    Ok(Value::Number(args[0].number_value().ceil()))
}

fn fn_round<'d>(_ctx: &Context<'d>, args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity("round", "1", args.len() == 1, args.len())?;
    Ok(Value::Number(round_half_up(args[0].number_value())))
}

// Extensions

fn fn_matches<'d>(_ctx: &Context<'d>, mut args: Vec<Value<'d>>) -> Result<Value<'d>> {
    check_arity(
        "matches",
        "2 or 3",
        args.len() == 2 || args.len() == 3,
        args.len(),
    )?;

    let flags = if args.len() == 3 {
        args.pop().map(|v| v.string_value()).unwrap_or_default()
    } else {
        String::new()
    };
    if flags.chars().any(|c| c != 'i') {
        return Err(Error::InvalidMatchFlags(flags));
    }

    let pattern = args.pop().map(|v| v.string_value()).unwrap_or_default();
    let input = args.pop().map(|v| v.string_value()).unwrap_or_default();

    let regex = RegexBuilder::new(&pattern)
        .case_insensitive(flags.contains('i'))
        .build()
        .map_err(|_| Error::InvalidMatchPattern(pattern.clone()))?;

    Ok(Value::Boolean(regex.is_match(&input)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    fn ctx(doc: &Document) -> Context<'_> {
        Context::new(doc.root())
    }

    #[test]
    fn substring_boundary_cases() {
        let doc = Document::parse_str("<r/>").unwrap();
        let c = ctx(&doc);
        macro_rules! s {
            ($args:expr) => {
                fn_substring(&c, $args).unwrap().string_value()
            };
        }

        let five = Value::String("12345".into());
        assert_eq!(
            s!(vec![five.clone(), Value::Number(0.0), Value::Number(3.0)]),
            "12"
        );
        assert_eq!(
            s!(vec![five.clone(), Value::Number(1.5), Value::Number(2.6)]),
            "234"
        );
        assert_eq!(
            s!(vec![
                five.clone(),
                Value::Number(-42.0),
                Value::Number(f64::INFINITY)
            ]),
            "12345"
        );
        assert_eq!(
            s!(vec![five.clone(), Value::Number(f64::NAN), Value::Number(3.0)]),
            ""
        );
        assert_eq!(s!(vec![five, Value::Number(2.0)]), "2345");
    }

    #[test]
    fn matches_flags_and_errors() {
        let doc = Document::parse_str("<r/>").unwrap();
        let c = ctx(&doc);

        let ok = fn_matches(
            &c,
            vec![Value::from("ajaxslt"), Value::from("^AJAX"), Value::from("i")],
        )
        .unwrap();
        assert!(ok.boolean_value());

        let err = fn_matches(
            &c,
            vec![Value::from("x"), Value::from("x"), Value::from("g")],
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid regular expression syntax: g"
        );

        let err = fn_matches(&c, vec![Value::from("x"), Value::from("(")]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid matches argument: (");
    }

    #[test]
    fn ends_with_edges() {
        let doc = Document::parse_str("<r/>").unwrap();
        let c = ctx(&doc);

        let f = |a: &str, b: &str| {
            fn_ends_with(&c, vec![Value::from(a), Value::from(b)])
                .unwrap()
                .boolean_value()
        };
        assert!(!f("", "foo"));
        assert!(f("foo", ""));
        assert!(f("foo", "oo"));
    }

    #[test]
    fn translate_maps_and_drops() {
        let doc = Document::parse_str("<r/>").unwrap();
        let c = ctx(&doc);

        let out = fn_translate(
            &c,
            vec![Value::from("bar"), Value::from("abc"), Value::from("ABC")],
        )
        .unwrap();
        assert_eq!(out.string_value(), "BAr");

        let out = fn_translate(
            &c,
            vec![Value::from("--aaa--"), Value::from("abc-"), Value::from("ABC")],
        )
        .unwrap();
        assert_eq!(out.string_value(), "AAA");
    }

    #[test]
    fn lang_walks_ancestors() {
        let doc = Document::parse_str(
            "<r xml:lang=\"en\"><p><s/></p><q xml:lang=\"de-AT\"/></r>",
        )
        .unwrap();
        let r = doc.root().first_child().unwrap();
        let s = r.first_child().unwrap().first_child().unwrap();
        let q = r.last_child().unwrap();

        let c = Context::new(s);
        assert!(fn_lang(&c, vec![Value::from("en")]).unwrap().boolean_value());
        assert!(!fn_lang(&c, vec![Value::from("de")]).unwrap().boolean_value());

        let c = Context::new(q);
        assert!(fn_lang(&c, vec![Value::from("de")]).unwrap().boolean_value());
    }

    #[test]
    fn arity_violations_are_reported() {
        let doc = Document::parse_str("<r/>").unwrap();
        let c = ctx(&doc);

        assert!(matches!(
            fn_count(&c, vec![]),
            Err(Error::Arity { function: "count", .. })
        ));
        assert!(matches!(
            fn_count(&c, vec![Value::Number(1.0)]),
            Err(Error::NodeSetExpected { function: "count" })
        ));
    }
}
