//! Chat adapter: renders a signature call as chat messages and parses the reply.
//!
//! Every field is delimited by a `[[ ## name ## ]]` marker and the reply ends
//! with `[[ ## completed ## ]]`. Demonstrations become user/assistant turns
//! placed between the system message and the live input.

use crate::error::GenerationError;
use crate::example::{Example, FieldMap};
use crate::signature::{Field, Signature, SignatureId};
use crate::types::{CompletionRequest, Message, Role};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Rationale field added to chain-of-thought predictors.
pub const REASONING_FIELD: Field = Field::new(
    "reasoning",
    "Think step by step in order to produce the outputs",
);

/// Value used when the model gives no rationale.
pub const REASONING_PLACEHOLDER: &str = "No reasoning generated";

/// Rendered in demonstrations for fields the example does not carry.
pub const MISSING_DEMO_FIELD: &str = "Not supplied for this particular example.";

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[ ## (\w+) ## \]\]").expect("marker regex is valid"));

static LISTED_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\. `(\w+)`").expect("field list regex is valid"));

/// Output fields of a call: the signature's outputs, preceded by `reasoning`
/// for chain-of-thought predictors. A signature that declares its own
/// `reasoning` output keeps its description but has it moved first.
pub fn output_fields(signature: &Signature, chain_of_thought: bool) -> Vec<Field> {
    if !chain_of_thought {
        return signature.outputs.to_vec();
    }
    let reasoning = signature
        .outputs
        .iter()
        .find(|f| f.name == REASONING_FIELD.name)
        .copied()
        .unwrap_or(REASONING_FIELD);
    let mut fields = Vec::with_capacity(signature.outputs.len() + 1);
    fields.push(reasoning);
    fields.extend(
        signature
            .outputs
            .iter()
            .filter(|f| f.name != REASONING_FIELD.name)
            .copied(),
    );
    fields
}

/// Build the full message list for one call.
pub fn format_messages(
    signature: &Signature,
    instructions: &str,
    outputs: &[Field],
    demos: &[Example],
    inputs: &FieldMap,
) -> Vec<Message> {
    let mut messages = vec![Message::system(system_message(
        signature,
        instructions,
        outputs,
    ))];

    for demo in demos {
        let relevant = signature
            .inputs
            .iter()
            .chain(outputs.iter())
            .any(|f| demo.contains(f.name));
        if !relevant {
            continue;
        }
        messages.push(Message::user(user_message(signature, outputs, |name| {
            demo.get(name)
        })));
        messages.push(Message::assistant(assistant_message(outputs, |name| {
            demo.get(name)
        })));
    }

    messages.push(Message::user(user_message(signature, outputs, |name| {
        inputs.get(name).map(|s| s.as_str())
    })));
    messages
}

/// A complete zero-shot exchange: the call's messages followed by the
/// assistant turn that produced `record`. Used to export fine-tuning data.
pub fn format_exchange(
    signature: &Signature,
    instructions: &str,
    outputs: &[Field],
    inputs: &FieldMap,
    record: &FieldMap,
) -> Vec<Message> {
    let mut messages = format_messages(signature, instructions, outputs, &[], inputs);
    messages.push(Message::assistant(assistant_message(outputs, |name| {
        record.get(name).map(|s| s.as_str())
    })));
    messages
}

fn field_list(fields: &[Field]) -> String {
    fields
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{}. `{}`: {}\n", i + 1, f.name, f.description))
        .collect()
}

fn system_message(signature: &Signature, instructions: &str, outputs: &[Field]) -> String {
    let mut structure = String::new();
    for f in signature.inputs.iter().chain(outputs.iter()) {
        structure.push_str(&format!("[[ ## {} ## ]]\n{{{}}}\n\n", f.name, f.name));
    }
    structure.push_str("[[ ## completed ## ]]\n");

    format!(
        "Your input fields are:\n{}\nYour output fields are:\n{}\n\
         All interactions will be structured in the following way, with the appropriate values filled in.\n\n\
         {}\nIn adhering to this structure, your objective is:\n\t{}",
        field_list(signature.inputs),
        field_list(outputs),
        structure,
        instructions
    )
}

fn user_message<'a>(
    signature: &Signature,
    outputs: &[Field],
    value: impl Fn(&str) -> Option<&'a str>,
) -> String {
    let mut msg = String::new();
    for f in signature.inputs {
        let v = value(f.name).unwrap_or(MISSING_DEMO_FIELD);
        msg.push_str(&format!("[[ ## {} ## ]]\n{}\n\n", f.name, v));
    }

    let names: Vec<String> = outputs.iter().map(|f| format!("`{}`", f.name)).collect();
    msg.push_str(&format!(
        "Respond with the corresponding output fields, starting with the field {}, and then ending with the marker for `completed`.",
        names.join(", then ")
    ));
    msg
}

fn assistant_message<'a>(outputs: &[Field], value: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut msg = String::new();
    for f in outputs {
        let v = value(f.name).unwrap_or(MISSING_DEMO_FIELD);
        msg.push_str(&format!("[[ ## {} ## ]]\n{}\n\n", f.name, v));
    }
    msg.push_str("[[ ## completed ## ]]\n");
    msg
}

/// Split text into `(field, content)` sections by marker, in order of appearance.
fn sections(text: &str) -> Vec<(String, String)> {
    let markers: Vec<(usize, usize, String)> = MARKER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((whole.start(), whole.end(), caps[1].to_string()))
        })
        .collect();

    markers
        .iter()
        .enumerate()
        .map(|(i, (_, end, name))| {
            let stop = markers.get(i + 1).map(|m| m.0).unwrap_or(text.len());
            (name.clone(), text[*end..stop].trim().to_string())
        })
        .collect()
}

/// Parse a model reply into the declared output fields.
///
/// Missing or blank `reasoning` is filled with [`REASONING_PLACEHOLDER`]; other missing
/// fields are empty strings. A reply without any declared field is accepted
/// only when it carries no markers and the call has a single non-rationale
/// output, in which case the whole text is that field.
pub fn parse_reply(
    signature: &Signature,
    outputs: &[Field],
    text: &str,
) -> Result<FieldMap, GenerationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GenerationError::Empty {
            signature: signature.name().to_string(),
        });
    }

    let mut parsed = FieldMap::new();
    let found = sections(trimmed);
    for (name, content) in &found {
        if outputs.iter().any(|f| f.name == name) && !parsed.contains_key(name) {
            parsed.insert(name.clone(), content.clone());
        }
    }

    if parsed.is_empty() {
        let answer_fields: Vec<&Field> = outputs
            .iter()
            .filter(|f| f.name != REASONING_FIELD.name)
            .collect();
        match (found.is_empty(), answer_fields.as_slice()) {
            (true, [only]) => {
                parsed.insert(only.name.to_string(), trimmed.to_string());
            }
            _ => {
                return Err(GenerationError::Unparseable {
                    signature: signature.name().to_string(),
                    expected: outputs
                        .iter()
                        .map(|f| f.name)
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
        }
    }

    for f in outputs {
        let value = parsed.entry(f.name.to_string()).or_default();
        if f.name == REASONING_FIELD.name && value.is_empty() {
            *value = REASONING_PLACEHOLDER.to_string();
        }
    }
    Ok(parsed)
}

/// Render a reply in the marker format. Handy for mock providers.
pub fn format_reply(fields: &[(&str, &str)]) -> String {
    let mut out = String::new();
    for (name, value) in fields {
        out.push_str(&format!("[[ ## {name} ## ]]\n{value}\n\n"));
    }
    out.push_str("[[ ## completed ## ]]");
    out
}

/// Identify which built-in signature a request was formatted for, by its
/// declared field lists. Instruction overrides do not affect the result.
pub fn signature_of(request: &CompletionRequest) -> Option<SignatureId> {
    let system = request.messages.iter().find(|m| m.role == Role::System)?;
    let (inputs_part, rest) = system.content.split_once("Your output fields are:")?;
    let outputs_part = rest.split("All interactions").next().unwrap_or(rest);

    let listed = |part: &str| -> BTreeSet<String> {
        part.lines()
            .filter_map(|line| LISTED_FIELD_RE.captures(line.trim()))
            .map(|caps| caps[1].to_string())
            .collect()
    };
    let inputs = listed(inputs_part);
    let mut outputs = listed(outputs_part);
    outputs.remove(REASONING_FIELD.name);

    SignatureId::ALL.into_iter().find(|id| {
        let sig = id.signature();
        sig.input_names().map(str::to_string).collect::<BTreeSet<_>>() == inputs
            && sig
                .output_names()
                .filter(|name| *name != REASONING_FIELD.name)
                .map(str::to_string)
                .collect::<BTreeSet<_>>()
                == outputs
    })
}

/// Value of an input field in the live (last) user message of a request.
pub fn input_value(request: &CompletionRequest, field: &str) -> Option<String> {
    let last = request.messages.iter().rev().find(|m| m.role == Role::User)?;
    sections(&last.content)
        .into_iter()
        .find(|(name, _)| name == field)
        .map(|(_, content)| {
            // the response instruction trails the last input section
            content
                .split("Respond with the corresponding output fields")
                .next()
                .unwrap_or("")
                .trim()
                .to_string()
        })
}
