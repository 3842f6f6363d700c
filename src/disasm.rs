//! A human-readable dump of compiled bytecode, for developer-facing debugging (the CLI's
//! `--disassemble` flag and anyone staring at a miscompiled script). Not part of the VM's
//! runtime behavior.

use crate::object::function::FunctionObj;
use crate::opcode::{Constant, Instruction};

/// Renders every instruction in `function` as `<index>  <line>  <mnemonic> <operands>`,
/// one per line. Nested functions referenced by a `Closure` constant are not recursed
/// into; disassemble them separately if needed.
pub fn disassemble(function: &FunctionObj) -> String {
  let mut out = format!("== {} ==\n", function.name);
  for (ip, instruction) in function.code.iter().enumerate() {
    let line = function.line_for(ip);
    out.push_str(&format!("{ip:04}  {line:>4}  {}\n", format_instruction(instruction, function)));
  }
  out
}

fn format_instruction(instruction: &Instruction, function: &FunctionObj) -> String {
  match instruction {
    Instruction::Constant(id) => format!("CONSTANT {} ({})", id.0, format_constant(function.constant(id.0))),
    Instruction::Null => "NULL".to_string(),
    Instruction::False => "FALSE".to_string(),
    Instruction::True => "TRUE".to_string(),
    Instruction::LoadLocal(i) => format!("LOAD_LOCAL {i}"),
    Instruction::StoreLocal(i) => format!("STORE_LOCAL {i}"),
    Instruction::LoadUpvalue(i) => format!("LOAD_UPVALUE {i}"),
    Instruction::StoreUpvalue(i) => format!("STORE_UPVALUE {i}"),
    Instruction::LoadModuleVar(i) => format!("LOAD_MODULE_VAR {i}"),
    Instruction::StoreModuleVar(i) => format!("STORE_MODULE_VAR {i}"),
    Instruction::LoadFieldThis(i) => format!("LOAD_FIELD_THIS {i}"),
    Instruction::StoreFieldThis(i) => format!("STORE_FIELD_THIS {i}"),
    Instruction::LoadField(i) => format!("LOAD_FIELD {i}"),
    Instruction::StoreField(i) => format!("STORE_FIELD {i}"),
    Instruction::Pop => "POP".to_string(),
    Instruction::Dup => "DUP".to_string(),
    Instruction::Call { symbol, arg_count } => format!("CALL {symbol} ({arg_count} args)"),
    Instruction::Super { symbol, arg_count, .. } => format!("SUPER {symbol} ({arg_count} args)"),
    Instruction::Jump(t) => format!("JUMP -> {}", t.0),
    Instruction::Loop(t) => format!("LOOP -> {}", t.0),
    Instruction::JumpIfFalse(t) => format!("JUMP_IF_FALSE -> {}", t.0),
    Instruction::And(t) => format!("AND -> {}", t.0),
    Instruction::Or(t) => format!("OR -> {}", t.0),
    Instruction::Class { name, num_fields, has_superclass } => {
      format!(
        "CLASS {} ({num_fields} fields, superclass={has_superclass})",
        format_constant(function.constant(name.0))
      )
    }
    Instruction::MethodInstance(s) => format!("METHOD_INSTANCE {s}"),
    Instruction::MethodStatic(s) => format!("METHOD_STATIC {s}"),
    Instruction::Closure { function: f, upvalues } => format!("CLOSURE {} ({} upvalues)", f.0, upvalues.len()),
    Instruction::LoadModule(id) => format!("LOAD_MODULE {}", format_constant(function.constant(id.0))),
    Instruction::ImportVariable(id) => format!("IMPORT_VARIABLE {}", format_constant(function.constant(id.0))),
    Instruction::CloseUpvalue => "CLOSE_UPVALUE".to_string(),
    Instruction::Return => "RETURN".to_string(),
    Instruction::Is => "IS".to_string(),
    Instruction::End => "END".to_string(),
  }
}

fn format_constant(constant: &Constant) -> String {
  match constant {
    Constant::Number(n) => n.to_string(),
    Constant::String(_) => "<string>".to_string(),
    Constant::Function(_) => "<function>".to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::opcode::ConstantId;

  #[test]
  fn dumps_instructions_in_order_with_line_numbers() {
    let function = FunctionObj {
      name: "test".into(),
      arity: 0,
      upvalue_count: 0,
      code: Box::new([Instruction::Constant(ConstantId(0)), Instruction::Return]),
      constants: Box::new([Constant::Number(42.0)]),
      lines: Box::new([1, 2]),
      module: None,
      source_path: "<test>".into(),
      max_stack: 1,
    };
    let text = disassemble(&function);
    assert!(text.contains("== test =="));
    assert!(text.contains("0000     1  CONSTANT 0 (42)"));
    assert!(text.contains("0001     2  RETURN"));
  }
}
