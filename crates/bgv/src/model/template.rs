//! Derived names: node name templates and graph title formats.

use crate::model::{Edge, EdgeKind, NodeClass, Properties, Value};

/// Renders a node's display name from its class template.
///
/// `{p#key}` is replaced by the node property `key`, `{i#port}` by the ids of
/// the nodes feeding input port `port`. A `/s` (short) or `/l` (long) suffix is
/// accepted and ignored. Unknown references render as `?`. An empty template
/// falls back to [`NodeClass::short_name`].
pub fn node_name(class: &NodeClass, properties: &Properties, inputs: &[&Edge]) -> String {
    let template = class.name_template.as_str();
    if template.is_empty() {
        return class.short_name().to_string();
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let reference = &after[..close];
        let reference = reference.split('/').next().unwrap_or(reference);
        match reference.split_once('#') {
            Some(("p", key)) => match properties.get(key) {
                Some(value) => out.push_str(&value.to_string()),
                None => out.push('?'),
            },
            Some(("i", port)) => {
                let ids: Vec<String> = inputs
                    .iter()
                    .filter(|e| e.kind == EdgeKind::Input)
                    .filter(|e| {
                        class
                            .inputs
                            .get(e.to_index)
                            .is_some_and(|p| p.port.name == port)
                    })
                    .map(|e| e.from.to_string())
                    .collect();
                if ids.is_empty() {
                    out.push('?');
                } else {
                    out.push_str(&ids.join(", "));
                }
            }
            _ => out.push('?'),
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Applies a printf-style graph title format to its arguments.
///
/// Supports `%s`, `%d`, `%x`, `%%`, `%n`, positional `%2$s` and ignores
/// widths. Conversions without a matching argument are copied verbatim.
pub fn format_title(format: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(format.len() + 16);
    let mut next_arg = 0usize;
    let mut chars = format.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut digits = String::new();
        let mut position = None;
        while let Some(&(_, d)) = chars.peek() {
            if d.is_ascii_digit() {
                digits.push(d);
                chars.next();
            } else if d == '$' && position.is_none() && !digits.is_empty() {
                position = digits.parse::<usize>().ok().and_then(|p| p.checked_sub(1));
                digits.clear();
                chars.next();
            } else {
                break;
            }
        }

        let Some((end, conversion)) = chars.next() else {
            out.push_str(&format[start..]);
            break;
        };
        let verbatim = &format[start..end + conversion.len_utf8()];

        match conversion {
            '%' => out.push('%'),
            'n' => out.push('\n'),
            's' | 'S' | 'd' | 'x' | 'X' => {
                let index = position.unwrap_or_else(|| {
                    let i = next_arg;
                    next_arg += 1;
                    i
                });
                match args.get(index) {
                    Some(arg) => out.push_str(&render(arg, conversion)),
                    None => out.push_str(verbatim),
                }
            }
            _ => out.push_str(verbatim),
        }
    }
    out
}

fn render(arg: &Value, conversion: char) -> String {
    match (conversion, arg) {
        ('x', Value::Int(v)) => format!("{:x}", v),
        ('x', Value::Long(v)) => format!("{:x}", v),
        ('X', Value::Int(v)) => format!("{:X}", v),
        ('X', Value::Long(v)) => format!("{:X}", v),
        ('S', v) => v.to_string().to_uppercase(),
        (_, v) => v.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{Klass, Port, TypedPort};

    fn class(template: &str) -> NodeClass {
        NodeClass {
            klass: Arc::new(Klass::new("n.ConstantNode")),
            name_template: template.to_string(),
            inputs: vec![TypedPort::new(Port::new("values", true), None)],
            successors: vec![],
        }
    }

    #[test]
    fn test_empty_template_uses_class_name() {
        assert_eq!(node_name(&class(""), &Properties::new(), &[]), "Constant");
    }

    #[test]
    fn test_property_substitution() {
        let props = Properties::new().with("rawvalue", 42);
        assert_eq!(node_name(&class("C({p#rawvalue/s})"), &props, &[]), "C(42)");
        assert_eq!(node_name(&class("{p#missing}"), &props, &[]), "?");
        assert_eq!(node_name(&class("open {p#rawvalue"), &props, &[]), "open {p#rawvalue");
    }

    #[test]
    fn test_input_substitution() {
        let c = class("Phi({i#values})");
        let a = Edge::input(&c, 0, Some(0), 4, 9).unwrap();
        let b = Edge::input(&c, 0, Some(1), 7, 9).unwrap();
        assert_eq!(node_name(&c, &Properties::new(), &[&a, &b]), "Phi(4, 7)");
        assert_eq!(node_name(&c, &Properties::new(), &[]), "Phi(?)");
    }

    #[test]
    fn test_format_title() {
        let args = vec![Value::from("After"), Value::Int(255)];
        assert_eq!(format_title("%s phase %d", &args), "After phase 255");
        assert_eq!(format_title("%2$x/%1$s", &args), "ff/After");
        assert_eq!(format_title("100%% %s %s", &args[..1]), "100% After %s");
        assert_eq!(format_title("%5s|%q", &args), "After|%q");
        assert_eq!(format_title("trailing %", &args), "trailing %");
    }
}
