//! Argument vectors for `zfs` subcommands.

use super::store::{ZfsProperty, ZfsType};

fn push_options(args: &mut Vec<String>, options: &[(&str, &str)]) {
    for (key, value) in options {
        args.push("-o".to_string());
        args.push(format!("{}={}", key, value));
    }
}

fn join<T, F: Fn(&T) -> &'static str>(items: &[T], name: F) -> String {
    items.iter().map(name).collect::<Vec<_>>().join(",")
}

pub fn create(dataset: &str, options: &[(&str, &str)]) -> Vec<String> {
    let mut args = vec!["create".to_string()];
    push_options(&mut args, options);
    args.push(dataset.to_string());
    args
}

pub fn destroy(target: &str) -> Vec<String> {
    vec!["destroy".to_string(), target.to_string()]
}

pub fn snapshot(dataset: &str, name: &str) -> Vec<String> {
    vec!["snapshot".to_string(), format!("{}@{}", dataset, name)]
}

pub fn clone_snapshot(snapshot: &str, dataset: &str, options: &[(&str, &str)]) -> Vec<String> {
    let mut args = vec!["clone".to_string()];
    push_options(&mut args, options);
    args.push(snapshot.to_string());
    args.push(dataset.to_string());
    args
}

/// `zfs list -H -p -o <props> [-r | -d N] [-t <types>] <dataset>`
pub fn list(
    dataset: &str,
    depth: Option<i32>,
    properties: &[ZfsProperty],
    types: &[ZfsType],
) -> Vec<String> {
    let mut args = vec![
        "list".to_string(),
        "-H".to_string(),
        "-p".to_string(),
        "-o".to_string(),
        join(properties, ZfsProperty::as_str),
    ];
    match depth {
        Some(d) if d < 0 => args.push("-r".to_string()),
        Some(d) => {
            args.push("-d".to_string());
            args.push(d.to_string());
        }
        None => {}
    }
    if !types.is_empty() {
        args.push("-t".to_string());
        args.push(join(types, ZfsType::as_str));
    }
    args.push(dataset.to_string());
    args
}

/// `zfs get -H -p -o property,value <props> <dataset>`
pub fn get(dataset: &str, properties: &[ZfsProperty]) -> Vec<String> {
    vec![
        "get".to_string(),
        "-H".to_string(),
        "-p".to_string(),
        "-o".to_string(),
        "property,value".to_string(),
        join(properties, ZfsProperty::as_str),
        dataset.to_string(),
    ]
}
