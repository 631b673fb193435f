use serde::Serialize;

use crate::migration::{PathResolver, ResolvedReference};

#[derive(Serialize)]
pub struct ResolveLine<'a> {
    pub input: &'a str,
    #[serde(flatten)]
    pub resolved: ResolvedReference,
    pub transferable: bool,
    pub destination_key: Option<String>,
}

/// One JSON line per input, without touching any store.
pub fn run(resolver: &PathResolver, inputs: &[String]) -> anyhow::Result<String> {
    let mut out = String::new();
    for input in inputs {
        let resolved = resolver.resolve(input);
        let transferable = resolved.is_transferable();
        let line = ResolveLine {
            input,
            destination_key: transferable.then(|| resolved.destination_key()),
            transferable,
            resolved,
        };
        out.push_str(&serde_json::to_string(&line)?);
        out.push('\n');
    }
    Ok(out)
}
