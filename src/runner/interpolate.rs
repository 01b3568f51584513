//! Variable substitution for strings
//!
//! Supported syntax:
//! - `$$` expands to a literal `$`
//! - `$(NAME)` expands to the evaluated value of `NAME`, passed through the
//!   ambient filter chain when one is in effect
//! - `$(NAME|)` expands `NAME` with no filters at all
//! - `$(NAME|f1|f2)` expands `NAME`, then applies `f1` and `f2` in order
//!
//! The value of `NAME` is itself substituted before it is inserted, so a
//! variable holding `$(OTHER)` resolves through to `OTHER`. Cyclic definitions
//! are a user error; they stop with [`Error::RecursiveSubstitution`] once the
//! nesting passes [`MAX_DEPTH`]. Delayed values that refer back to themselves
//! are bounded the same way.

use crate::error::{Error, Result};
use crate::runner::{Context, Slot, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

/// Maximum nesting of variable evaluations within one substitution
pub const MAX_DEPTH: usize = 64;

/// `$$`, a complete `$(...)`, or an unterminated `$(`
static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\$|\$\(([^)]*)\)|\$\(").expect("substitution pattern is valid")
});

/// Evaluate a variable: resolve delayed values, then substitute the result
pub fn evaluate(ctx: &Context, name: &str) -> Result<Value> {
    evaluate_at(ctx, name, 0)
}

/// Substitute every string inside `value`
///
/// Lists substitute each item, maps each value (never a key); other scalars
/// pass through. `filter` is the ambient `|`-separated filter chain applied to
/// references that do not name their own filters.
pub fn subst(ctx: &Context, value: &Value, filter: Option<&str>) -> Result<Value> {
    subst_at(ctx, value, filter, 0)
}

/// Substitute a single string
pub fn subst_str(ctx: &Context, text: &str, filter: Option<&str>) -> Result<String> {
    expand(ctx, text, filter, 0)
}

/// Escape a string so that substituting it yields the original text
pub fn escape(text: &str) -> String {
    text.replace('$', "$$")
}

fn evaluate_at(ctx: &Context, name: &str, depth: usize) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(Error::RecursiveSubstitution(name.to_string()));
    }

    let raw = match &ctx.env.get(name)?.slot {
        Slot::Value(value) => value.clone(),
        Slot::Delayed(delayed) => {
            let _resolving = ctx.enter_delayed(name)?;
            delayed.resolve(ctx)?
        }
    };
    trace!(var = %name, depth, "evaluate");
    subst_at(ctx, &raw, None, depth + 1)
}

fn subst_at(ctx: &Context, value: &Value, filter: Option<&str>, depth: usize) -> Result<Value> {
    Ok(match value {
        Value::Str(s) => Value::Str(expand(ctx, s, filter, depth)?),
        Value::Literal(s) => Value::Str(s.clone()),
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| subst_at(ctx, item, filter, depth))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(key, item)| Ok((key.clone(), subst_at(ctx, item, filter, depth)?)))
                .collect::<Result<_>>()?,
        ),
        other => other.clone(),
    })
}

fn expand(ctx: &Context, text: &str, filter: Option<&str>, depth: usize) -> Result<String> {
    let mut result = String::with_capacity(text.len());
    let mut last = 0;

    for caps in REFERENCE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        result.push_str(&text[last..whole.start()]);
        last = whole.end();

        if whole.as_str() == "$$" {
            result.push('$');
            continue;
        }

        match caps.get(1) {
            Some(reference) => result.push_str(&replace(ctx, reference.as_str(), filter, depth)?),
            None => return Err(Error::SubstitutionSyntax(text.to_string())),
        }
    }

    result.push_str(&text[last..]);
    Ok(result)
}

/// Expand the inside of one `$(...)` reference
fn replace(ctx: &Context, reference: &str, filter: Option<&str>, depth: usize) -> Result<String> {
    let mut parts = reference.split('|');
    let name = parts.next().unwrap_or_default();
    let text = evaluate_at(ctx, name, depth + 1)?.to_string();

    // Explicit filters (even an empty list) replace the ambient chain
    if reference.contains('|') {
        ctx.filters.apply_chain(&text, parts)
    } else if let Some(chain) = filter {
        ctx.filters.apply_chain(&text, chain.split('|'))
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Wrapped;
    use indexmap::IndexMap;

    fn ctx_with(vars: &[(&str, &str)]) -> Context {
        let mut ctx = Context::new();
        for (name, value) in vars {
            ctx.env.set(name, *value).unwrap();
        }
        ctx
    }

    #[test]
    fn test_dollar_dollar() {
        let ctx = Context::new();
        assert_eq!(subst_str(&ctx, "$$", None).unwrap(), "$");
        assert_eq!(subst_str(&ctx, "cost: $$5", None).unwrap(), "cost: $5");
    }

    #[test]
    fn test_simple_reference() {
        let ctx = ctx_with(&[("NAME", "hi")]);
        assert_eq!(subst_str(&ctx, "$(NAME)", None).unwrap(), "hi");
        assert_eq!(
            subst_str(&ctx, "say $(NAME), $(NAME)!", None).unwrap(),
            "say hi, hi!"
        );
    }

    #[test]
    fn test_indirection() {
        let ctx = ctx_with(&[("A", "$(B)"), ("B", "x")]);
        assert_eq!(evaluate(&ctx, "A").unwrap(), Value::from("x"));
    }

    #[test]
    fn test_evaluated_dollars_are_not_rescanned() {
        let ctx = ctx_with(&[("PRICE", "$$(B)")]);
        assert_eq!(subst_str(&ctx, "[$(PRICE)]", None).unwrap(), "[$(B)]");
    }

    #[test]
    fn test_plain_text_and_lone_dollar() {
        let ctx = Context::new();
        assert_eq!(subst_str(&ctx, "no refs here", None).unwrap(), "no refs here");
        assert_eq!(subst_str(&ctx, "a $ b $x", None).unwrap(), "a $ b $x");
    }

    #[test]
    fn test_unterminated_reference() {
        let ctx = ctx_with(&[("A", "x")]);
        assert!(matches!(
            subst_str(&ctx, "oops $(A", None),
            Err(Error::SubstitutionSyntax(_))
        ));
    }

    #[test]
    fn test_missing_variable() {
        let ctx = Context::new();
        assert!(matches!(
            subst_str(&ctx, "$(MISSING)", None),
            Err(Error::VariableNotFound(_))
        ));
    }

    #[test]
    fn test_explicit_filters() {
        let ctx = ctx_with(&[("NAME", " Bob ")]);
        assert_eq!(
            subst_str(&ctx, "$(NAME|trim|upper)", None).unwrap(),
            "BOB"
        );
    }

    #[test]
    fn test_ambient_filter_and_override() {
        let ctx = ctx_with(&[("FILE", "my file")]);
        assert_eq!(
            subst_str(&ctx, "cat $(FILE)", Some("shell")).unwrap(),
            "cat 'my file'"
        );
        // Empty explicit list disables the ambient chain
        assert_eq!(
            subst_str(&ctx, "cat $(FILE|)", Some("shell")).unwrap(),
            "cat my file"
        );
        // Explicit filters replace it
        assert_eq!(
            subst_str(&ctx, "cat $(FILE|upper)", Some("shell")).unwrap(),
            "cat MY FILE"
        );
    }

    #[test]
    fn test_unknown_filter() {
        let ctx = ctx_with(&[("A", "x")]);
        assert!(matches!(
            subst_str(&ctx, "$(A|nope)", None),
            Err(Error::FilterNotFound(_))
        ));
    }

    #[test]
    fn test_escape_roundtrip() {
        let ctx = Context::new();
        let escaped = escape("a$b");
        assert_eq!(escaped, "a$$b");
        assert_eq!(subst_str(&ctx, &escaped, None).unwrap(), "a$b");
    }

    #[test]
    fn test_containers() {
        let ctx = ctx_with(&[("X", "1")]);
        let mut map = IndexMap::new();
        map.insert("$(X)".to_string(), Value::from("v$(X)"));
        let value = Value::List(vec![
            Value::from("$(X)"),
            Value::Map(map),
            Value::Int(7),
            Value::Bool(true),
        ]);

        let result = subst(&ctx, &value, None).unwrap();
        let Value::List(items) = result else {
            panic!("expected a list");
        };
        assert_eq!(items[0], Value::from("1"));
        let Value::Map(map) = &items[1] else {
            panic!("expected a map");
        };
        assert_eq!(map.get("$(X)"), Some(&Value::from("v1")));
        assert_eq!(items[2], Value::Int(7));
        assert_eq!(items[3], Value::Bool(true));
    }

    #[test]
    fn test_literal_is_untouched() {
        let mut ctx = Context::new();
        ctx.env
            .set("RAW", Value::Literal("$(NOT_A_VAR)".to_string()))
            .unwrap();
        assert_eq!(evaluate(&ctx, "RAW").unwrap(), Value::from("$(NOT_A_VAR)"));
        assert_eq!(subst_str(&ctx, "<$(RAW)>", None).unwrap(), "<$(NOT_A_VAR)>");
    }

    #[test]
    fn test_cycle_is_reported() {
        let ctx = ctx_with(&[("A", "$(B)"), ("B", "$(A)")]);
        assert!(matches!(
            evaluate(&ctx, "A"),
            Err(Error::RecursiveSubstitution(_))
        ));
    }

    #[test]
    fn test_self_referencing_delayed_is_reported() {
        let mut ctx = Context::new();
        ctx.env
            .set("A", Wrapped::delayed(|ctx| ctx.evaluate("A"), false))
            .unwrap();
        assert!(matches!(
            evaluate(&ctx, "A"),
            Err(Error::RecursiveSubstitution(ref name)) if name == "A"
        ));

        // the nesting count unwinds with the error
        ctx.env.set("B", Wrapped::delayed(|_| Ok(Value::from("b")), false)).unwrap();
        assert_eq!(evaluate(&ctx, "B").unwrap(), Value::from("b"));
    }

    #[test]
    fn test_delayed_cycle_through_substitution() {
        let mut ctx = Context::new();
        ctx.env
            .set("X", Wrapped::delayed(|ctx| Ok(Value::from(ctx.subst_str("[$(Y)]")?)), true))
            .unwrap();
        ctx.env
            .set("Y", Wrapped::delayed(|ctx| ctx.evaluate("X"), true))
            .unwrap();
        assert!(matches!(
            evaluate(&ctx, "X"),
            Err(Error::RecursiveSubstitution(_))
        ));
    }

    #[test]
    fn test_delayed_is_resolved_then_substituted() {
        let mut ctx = ctx_with(&[("WHO", "world")]);
        ctx.env
            .set(
                "GREETING",
                Wrapped::delayed(|_| Ok(Value::from("hello $(WHO)")), true),
            )
            .unwrap();
        assert_eq!(evaluate(&ctx, "GREETING").unwrap(), Value::from("hello world"));
    }
}
