//! Small lodash-like helper surface exposed to scripts as `utils`.
//!
//! Arrays already carry Rhai's own methods (`push`, `filter`, `map`, ...);
//! these helpers cover what the array API lacks.

use std::cmp::Ordering;

use rhai::{Array, Dynamic, Engine, EvalAltResult, FnPtr, Map, NativeCallContext, Position};

use super::convert::{dynamic_to_json, json_equal};

type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct UtilityLib;

/// How `sortBy` / `uniqBy` derive the key of an item.
enum KeySelector {
    Path(String),
    Function(FnPtr),
}

impl KeySelector {
    fn key(&self, ctx: &NativeCallContext<'_>, item: &Dynamic) -> RhaiResult<Dynamic> {
        match self {
            KeySelector::Path(path) => Ok(get_path(item, path).unwrap_or(Dynamic::UNIT)),
            KeySelector::Function(func) => func.call_within_context(ctx, (item.clone(),)),
        }
    }
}

fn deep_clone(value: &Dynamic) -> Dynamic {
    let value = value.flatten_clone();
    if let Some(items) = value.clone().try_cast::<Array>() {
        return Dynamic::from_array(items.iter().map(deep_clone).collect());
    }
    if let Some(map) = value.clone().try_cast::<Map>() {
        return Dynamic::from_map(
            map.iter()
                .map(|(key, item)| (key.clone(), deep_clone(item)))
                .collect(),
        );
    }
    value
}

/// Walk a `a.b[0].c` style path through maps and arrays.
fn get_path(value: &Dynamic, path: &str) -> Option<Dynamic> {
    let mut current = value.flatten_clone();
    for segment in path_segments(path) {
        current = match segment {
            Segment::Key(key) => current.try_cast::<Map>()?.get(key.as_str())?.flatten_clone(),
            Segment::Index(index) => current.try_cast::<Array>()?.get(index)?.flatten_clone(),
        };
    }
    Some(current)
}

enum Segment {
    Key(String),
    Index(usize),
}

fn path_segments(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for part in path.split('.').filter(|part| !part.is_empty()) {
        let mut rest = part;
        if let Some(open) = rest.find('[') {
            if open > 0 {
                segments.push(Segment::Key(rest[..open].to_string()));
            }
            rest = &rest[open..];
            while let Some(stripped) = rest.strip_prefix('[') {
                let Some(close) = stripped.find(']') else {
                    break;
                };
                let inner = &stripped[..close];
                match inner.parse::<usize>() {
                    Ok(index) => segments.push(Segment::Index(index)),
                    Err(_) => segments.push(Segment::Key(inner.trim_matches('"').to_string())),
                }
                rest = &stripped[close + 1..];
            }
        } else {
            match rest.parse::<usize>() {
                Ok(index) => segments.push(Segment::Index(index)),
                Err(_) => segments.push(Segment::Key(rest.to_string())),
            }
        }
    }
    segments
}

/// Unit sorts first, numbers by value, everything else by its display form.
fn compare_dynamic(left: &Dynamic, right: &Dynamic) -> Ordering {
    match (left.is_unit(), right.is_unit()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
    }
    left.to_string().cmp(&right.to_string())
}

fn as_number(value: &Dynamic) -> Option<f64> {
    value
        .as_int()
        .map(|int| int as f64)
        .ok()
        .or_else(|| value.as_float().ok())
}

fn sort_by(ctx: &NativeCallContext<'_>, items: Array, selector: KeySelector) -> RhaiResult<Array> {
    let mut keyed = items
        .into_iter()
        .map(|item| selector.key(ctx, &item).map(|key| (key, item)))
        .collect::<RhaiResult<Vec<_>>>()?;
    keyed.sort_by(|(a, _), (b, _)| compare_dynamic(a, b));
    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

fn uniq_by(ctx: &NativeCallContext<'_>, items: Array, selector: KeySelector) -> RhaiResult<Array> {
    let mut seen = Vec::new();
    let mut unique = Array::new();
    for item in items {
        let key = dynamic_to_json(&selector.key(ctx, &item)?)?;
        if seen.iter().any(|existing| json_equal(existing, &key)) {
            continue;
        }
        seen.push(key);
        unique.push(item);
    }
    Ok(unique)
}

fn is_empty(value: &Dynamic) -> bool {
    let value = value.flatten_clone();
    if value.is_unit() {
        return true;
    }
    if let Some(items) = value.clone().try_cast::<Array>() {
        return items.is_empty();
    }
    if let Some(map) = value.clone().try_cast::<Map>() {
        return map.is_empty();
    }
    if let Ok(text) = value.into_immutable_string() {
        return text.is_empty();
    }
    false
}

fn not_a_map(name: &str) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        Dynamic::from(format!("utils.{name} expects an object map")),
        Position::NONE,
    ))
}

fn as_map(name: &str, value: Dynamic) -> RhaiResult<Map> {
    value.flatten().try_cast::<Map>().ok_or_else(|| not_a_map(name))
}

pub(crate) fn register(engine: &mut Engine) {
    engine.register_type_with_name::<UtilityLib>("UtilityLib");

    engine.register_fn("clone", |_: &mut UtilityLib, value: Dynamic| deep_clone(&value));
    engine.register_fn("get", |_: &mut UtilityLib, value: Dynamic, path: &str| {
        get_path(&value, path).unwrap_or(Dynamic::UNIT)
    });
    engine.register_fn(
        "get",
        |_: &mut UtilityLib, value: Dynamic, path: &str, fallback: Dynamic| {
            match get_path(&value, path) {
                Some(found) if !found.is_unit() => found,
                _ => fallback,
            }
        },
    );
    engine.register_fn(
        "sortBy",
        |ctx: NativeCallContext<'_>, _: &mut UtilityLib, items: Array, key: &str| {
            sort_by(&ctx, items, KeySelector::Path(key.to_string()))
        },
    );
    engine.register_fn(
        "sortBy",
        |ctx: NativeCallContext<'_>, _: &mut UtilityLib, items: Array, key: FnPtr| {
            sort_by(&ctx, items, KeySelector::Function(key))
        },
    );
    engine.register_fn(
        "uniqBy",
        |ctx: NativeCallContext<'_>, _: &mut UtilityLib, items: Array, key: &str| {
            uniq_by(&ctx, items, KeySelector::Path(key.to_string()))
        },
    );
    engine.register_fn(
        "uniqBy",
        |ctx: NativeCallContext<'_>, _: &mut UtilityLib, items: Array, key: FnPtr| {
            uniq_by(&ctx, items, KeySelector::Function(key))
        },
    );
    engine.register_fn("keys", |_: &mut UtilityLib, value: Dynamic| -> RhaiResult<Array> {
        Ok(as_map("keys", value)?
            .keys()
            .map(|key| Dynamic::from(key.to_string()))
            .collect())
    });
    engine.register_fn("values", |_: &mut UtilityLib, value: Dynamic| -> RhaiResult<Array> {
        Ok(as_map("values", value)?.into_values().collect())
    });
    engine.register_fn("entries", |_: &mut UtilityLib, value: Dynamic| -> RhaiResult<Array> {
        Ok(as_map("entries", value)?
            .into_iter()
            .map(|(key, item)| Dynamic::from_array(vec![Dynamic::from(key.to_string()), item]))
            .collect())
    });
    engine.register_fn(
        "assign",
        |_: &mut UtilityLib, target: Dynamic, source: Dynamic| -> RhaiResult<Map> {
            let mut merged = as_map("assign", target)?;
            merged.extend(as_map("assign", source)?);
            Ok(merged)
        },
    );
    engine.register_fn(
        "isEqual",
        |_: &mut UtilityLib, left: Dynamic, right: Dynamic| -> RhaiResult<bool> {
            Ok(json_equal(&dynamic_to_json(&left)?, &dynamic_to_json(&right)?))
        },
    );
    engine.register_fn("isEmpty", |_: &mut UtilityLib, value: Dynamic| is_empty(&value));
}
