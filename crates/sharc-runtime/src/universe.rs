//! A deterministic in-process module world.
//!
//! [`ModuleUniverse`] is the reference [`ModuleHost`]: a fixed set of
//! module definitions, loaded from a TOML manifest, whose bodies are
//! written in a one-statement-per-line literal language and lowered to a
//! small two-byte instruction set. Compiling the same name in the same
//! import context always yields the same code object, so archives built
//! from a universe are reproducible byte for byte.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use sharc_archive::ModuleName;
use sharc_object::{CodeObject, IntValue, ObjectHeap, ObjectNode, ObjectRef};

use crate::error::{RuntimeError, RuntimeResult};
use crate::host::{CompiledModule, ImportContext, ModuleHost, CODE_FLAG_PACKAGE};

/// Module every run imports first when the host defines it.
pub const BOOTSTRAP_MODULE: &str = "prelude";

// Instruction set: two bytes per instruction, opcode then a pool slot.
const OP_IMPORT_NAME: u8 = 0x01;
const OP_LOAD_CONST: u8 = 0x02;
const OP_STORE_NAME: u8 = 0x03;
const OP_RETURN_VALUE: u8 = 0x04;

const MAX_LITERAL_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// One module in a universe manifest.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleDef {
    /// Package modules may hold submodules underneath their name.
    pub package: bool,
    /// Imports the body performs, in order.
    pub requires: Vec<String>,
    /// Statements, one per line: `const <name> = <literal>`.
    pub body: String,
    /// Reflective bodies fold the set of already-loaded modules into a
    /// constant, so their compiled form depends on when they are imported.
    pub reflective: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Manifest {
    module: BTreeMap<String, ModuleDef>,
}

/// Manifest behind [`ModuleUniverse::standard`]. Exercises every literal
/// form the body language has, one package, and one reflective module.
const STANDARD_MANIFEST: &str = r##"
[module.prelude]
body = '''
const banner = "sharc prelude"
const release = 1
'''

[module.textio]
body = '''
const newline = "\n"
const tab = "\t"
const bom = b"\xef\xbb\xbf"
'''

[module.pkg]
package = true
requires = ["textio"]
body = '''
const default_encoding = "utf-8"
'''

[module."pkg.settings"]
body = '''
const markers = {"alpha", "beta", "rc"}
const empty = ()
'''

[module."pkg.numbers"]
body = '''
const big = 123456789012345678901234567890
const tiny = -42
const ratio = 2.5
const magic = b"\x00\x01\xff"
const flags = (true, false, none)
'''

[module.probe]
reflective = true
body = '''
const role = "import-order probe"
'''
"##;

// ---------------------------------------------------------------------------
// Universe
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct ModuleUniverse {
    modules: BTreeMap<ModuleName, ModuleDef>,
}

impl ModuleUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one module definition.
    pub fn define(&mut self, name: &str, def: ModuleDef) -> RuntimeResult<()> {
        self.modules.insert(ModuleName::parse(name)?, def);
        Ok(())
    }

    pub fn from_manifest_str(text: &str) -> RuntimeResult<Self> {
        let manifest: Manifest = toml::from_str(text)
            .map_err(|e| RuntimeError::Config { reason: format!("manifest: {e}") })?;
        let mut universe = Self::new();
        for (name, def) in manifest.module {
            universe.define(&name, def)?;
        }
        Ok(universe)
    }

    pub fn from_manifest_path(path: &Path) -> RuntimeResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_manifest_str(&text)
    }

    /// The built-in universe used when no manifest is given.
    pub fn standard() -> RuntimeResult<Self> {
        Self::from_manifest_str(STANDARD_MANIFEST)
    }

    /// Defined module names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &ModuleName> {
        self.modules.keys()
    }
}

impl ModuleHost for ModuleUniverse {
    fn contains(&self, name: &ModuleName) -> bool {
        self.modules.contains_key(name)
    }

    fn compile(
        &self,
        name: &ModuleName,
        heap: &mut ObjectHeap,
        ctx: &ImportContext,
    ) -> RuntimeResult<CompiledModule> {
        let def = self
            .modules
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownModule(name.to_string()))?;
        let mut requires = Vec::with_capacity(def.requires.len());
        for text in &def.requires {
            requires.push(ModuleName::parse(text)?);
        }

        let mut lowering = Lowering::begin(name, heap);
        for require in &requires {
            lowering.import_statement(require)?;
        }
        let mut last_line = 0;
        for (index, raw) in def.body.lines().enumerate() {
            let text = raw.trim();
            last_line = index + 1;
            if text.is_empty() {
                continue;
            }
            lowering.statement(last_line, text)?;
        }
        if def.reflective {
            lowering.reflective_statement(last_line + 1, ctx)?;
        }
        let code = lowering.finish(def.package)?;
        Ok(CompiledModule { code, requires })
    }
}

// ---------------------------------------------------------------------------
// Lowering
// ---------------------------------------------------------------------------

/// Lowers one module body into a code object.
struct Lowering<'h> {
    name: ModuleName,
    heap: &'h mut ObjectHeap,
    consts: Vec<ObjectRef>,
    names: Vec<(String, ObjectRef)>,
    code: Vec<u8>,
    lines: Vec<u8>,
    line: u8,
}

impl<'h> Lowering<'h> {
    fn begin(name: &ModuleName, heap: &'h mut ObjectHeap) -> Self {
        // Slot 0 of the constant pool is always None, for the final return.
        let none = heap.none();
        Lowering {
            name: name.clone(),
            heap,
            consts: vec![none],
            names: Vec::new(),
            code: Vec::new(),
            lines: Vec::new(),
            line: 1,
        }
    }

    fn fail(&self, reason: String) -> RuntimeError {
        RuntimeError::Compile { name: self.name.to_string(), reason }
    }

    fn push_op(&mut self, opcode: u8, operand: u8) {
        self.code.push(opcode);
        self.code.push(operand);
        self.lines.push(self.line);
    }

    /// Slot of `text` in the names pool, interning repeats.
    fn name_slot(&mut self, text: &str) -> RuntimeResult<u8> {
        if let Some(at) = self.names.iter().position(|(known, _)| known == text) {
            return Ok(at as u8);
        }
        let slot = self.names.len();
        if slot > u8::MAX as usize {
            return Err(self.fail("too many names in one module".to_string()));
        }
        let r = self.heap.alloc_str(text);
        self.names.push((text.to_string(), r));
        Ok(slot as u8)
    }

    fn const_slot(&mut self, value: ObjectRef) -> RuntimeResult<u8> {
        let slot = self.consts.len();
        if slot > u8::MAX as usize {
            return Err(self.fail("too many constants in one module".to_string()));
        }
        self.consts.push(value);
        Ok(slot as u8)
    }

    /// Import `require` and bind its top-level name, the way a plain
    /// `import a.b` binds `a`.
    fn import_statement(&mut self, require: &ModuleName) -> RuntimeResult<()> {
        let target = self.name_slot(require.as_str())?;
        let top = require.components().next().unwrap_or(require.as_str());
        let binding = self.name_slot(top)?;
        self.push_op(OP_IMPORT_NAME, target);
        self.push_op(OP_STORE_NAME, binding);
        Ok(())
    }

    /// Parse and lower one `const <name> = <literal>` statement.
    fn statement(&mut self, line: usize, text: &str) -> RuntimeResult<()> {
        self.line = u8::try_from(line)
            .map_err(|_| self.fail("module body is too long".to_string()))?;
        let rest = text
            .strip_prefix("const ")
            .ok_or_else(|| self.fail(format!("line {line}: expected a const statement")))?;
        let (ident, value) = rest
            .split_once('=')
            .ok_or_else(|| self.fail(format!("line {line}: expected `=`")))?;
        let ident = ident.trim();
        if !is_identifier(ident) {
            return Err(self.fail(format!("line {line}: invalid name {ident:?}")));
        }
        let literal = parse_literal(value.trim())
            .map_err(|reason| self.fail(format!("line {line}: {reason}")))?;
        let value_ref = alloc_literal(self.heap, &literal)?;
        let const_slot = self.const_slot(value_ref)?;
        let name_slot = self.name_slot(ident)?;
        self.push_op(OP_LOAD_CONST, const_slot);
        self.push_op(OP_STORE_NAME, name_slot);
        Ok(())
    }

    /// Lower `const witnessed = ("<loaded>", ...)` from the import
    /// context. Module names never need quoting, so the statement can be
    /// assembled textually and fed through the normal path.
    fn reflective_statement(&mut self, line: usize, ctx: &ImportContext) -> RuntimeResult<()> {
        let mut source = String::from("const witnessed = (");
        for loaded in &ctx.loaded {
            source.push('"');
            source.push_str(loaded.as_str());
            source.push_str("\", ");
        }
        source.push(')');
        self.statement(line, &source)
    }

    fn finish(mut self, package: bool) -> RuntimeResult<ObjectRef> {
        self.push_op(OP_LOAD_CONST, 0);
        self.push_op(OP_RETURN_VALUE, 0);

        let heap = self.heap;
        let name_ref = heap.alloc_str(self.name.last_component());
        let qualname_ref = if self.name.is_top_level() {
            name_ref
        } else {
            heap.alloc_str(self.name.as_str())
        };
        let filename_ref = heap.alloc_str(&module_file(&self.name, package));
        let consts = heap.alloc_tuple(self.consts)?;
        let names = heap.alloc_tuple(self.names.into_iter().map(|(_, r)| r).collect())?;
        let empty = heap.alloc_tuple(Vec::new())?;
        let instructions = heap.alloc_bytes(&self.code);
        let line_table = heap.alloc_bytes(&self.lines);
        let exception_table = heap.alloc_bytes(&[]);

        Ok(heap.alloc(ObjectNode::Code(CodeObject {
            name: name_ref,
            qualname: qualname_ref,
            filename: filename_ref,
            arg_count: 0,
            posonly_arg_count: 0,
            kwonly_arg_count: 0,
            local_count: 0,
            stack_size: 1,
            flags: if package { CODE_FLAG_PACKAGE } else { 0 },
            first_line: 1,
            consts,
            names,
            varnames: empty,
            freevars: empty,
            cellvars: empty,
            instructions,
            line_table,
            exception_table,
        })))
    }
}

/// Source path a universe module reports, mirroring a file tree layout.
fn module_file(name: &ModuleName, package: bool) -> String {
    let stem = name.as_str().replace('.', "/");
    if package {
        format!("universe://{stem}/__init__.mod")
    } else {
        format!("universe://{stem}.mod")
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ---------------------------------------------------------------------------
// Literals
// ---------------------------------------------------------------------------

/// Parse `source` as a body-language literal and allocate it in `heap`.
///
/// This is the expression surface behind the debug dump mode: the same
/// literal language module bodies use, evaluated standalone.
pub fn eval_literal(heap: &mut ObjectHeap, source: &str) -> RuntimeResult<ObjectRef> {
    let literal = parse_literal(source.trim()).map_err(|reason| RuntimeError::Compile {
        name: "<literal>".to_string(),
        reason,
    })?;
    alloc_literal(heap, &literal)
}

#[derive(Clone, Debug, PartialEq)]
enum Literal {
    None,
    Bool(bool),
    /// Decimal text, possibly signed, any length.
    Int(String),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Literal>),
    Set(Vec<Literal>),
}

fn parse_literal(text: &str) -> Result<Literal, String> {
    LiteralParser::parse(text)
}

fn alloc_literal(heap: &mut ObjectHeap, literal: &Literal) -> RuntimeResult<ObjectRef> {
    Ok(match literal {
        Literal::None => heap.none(),
        Literal::Bool(value) => heap.bool_ref(*value),
        Literal::Int(text) => heap.alloc(ObjectNode::Int(IntValue::from_decimal(text)?)),
        Literal::Float(value) => heap.alloc_float(*value),
        Literal::Str(text) => heap.alloc_str(text),
        Literal::Bytes(raw) => heap.alloc_bytes(raw),
        Literal::Tuple(items) => {
            let mut refs = Vec::with_capacity(items.len());
            for item in items {
                refs.push(alloc_literal(heap, item)?);
            }
            heap.alloc_tuple(refs)?
        }
        Literal::Set(items) => {
            let mut refs = Vec::with_capacity(items.len());
            for item in items {
                refs.push(alloc_literal(heap, item)?);
            }
            heap.alloc_frozen_set(refs)?
        }
    })
}

struct LiteralParser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> LiteralParser<'a> {
    fn parse(text: &str) -> Result<Literal, String> {
        let mut parser = LiteralParser { bytes: text.as_bytes(), pos: 0 };
        parser.skip_spaces();
        let value = parser.value(0)?;
        parser.skip_spaces();
        if parser.pos != parser.bytes.len() {
            return Err(format!("trailing input at byte {}", parser.pos));
        }
        Ok(value)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_spaces(&mut self) {
        while self.peek().is_some_and(|b| b == b' ' || b == b'\t') {
            self.pos += 1;
        }
    }

    fn expect(&mut self, what: u8) -> Result<(), String> {
        match self.bump() {
            Some(b) if b == what => Ok(()),
            Some(b) => Err(format!("expected {:?}, found {:?}", what as char, b as char)),
            None => Err(format!("expected {:?}, found end of input", what as char)),
        }
    }

    fn value(&mut self, depth: usize) -> Result<Literal, String> {
        if depth >= MAX_LITERAL_DEPTH {
            return Err("literal nesting is too deep".to_string());
        }
        match self.peek() {
            Some(b'"') => self.quoted_str(),
            Some(b'b') if self.bytes.get(self.pos + 1) == Some(&b'"') => self.quoted_bytes(),
            Some(b'(') => self.sequence(b'(', b')', depth).map(Literal::Tuple),
            Some(b'{') => self.sequence(b'{', b'}', depth).map(Literal::Set),
            Some(b) if b == b'-' || b.is_ascii_digit() => self.number(),
            Some(b) if b.is_ascii_alphabetic() => self.word(),
            Some(b) => Err(format!("unexpected character {:?}", b as char)),
            None => Err("expected a literal, found end of input".to_string()),
        }
    }

    fn word(&mut self) -> Result<Literal, String> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        match &self.bytes[start..self.pos] {
            b"none" => Ok(Literal::None),
            b"true" => Ok(Literal::Bool(true)),
            b"false" => Ok(Literal::Bool(false)),
            other => Err(format!("unknown word {:?}", String::from_utf8_lossy(other))),
        }
    }

    fn number(&mut self) -> Result<Literal, String> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let mut float = false;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => self.pos += 1,
                b'.' | b'e' | b'E' => {
                    float = true;
                    self.pos += 1;
                }
                b'+' | b'-' if float => self.pos += 1,
                _ => break,
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| "invalid number".to_string())?;
        if text == "-" || text.is_empty() {
            return Err("expected digits".to_string());
        }
        if float {
            let value: f64 = text.parse().map_err(|_| format!("invalid float {text:?}"))?;
            Ok(Literal::Float(value))
        } else {
            Ok(Literal::Int(text.to_string()))
        }
    }

    fn quoted_str(&mut self) -> Result<Literal, String> {
        let raw = self.quoted()?;
        let text =
            String::from_utf8(raw).map_err(|_| "string is not valid UTF-8".to_string())?;
        Ok(Literal::Str(text))
    }

    fn quoted_bytes(&mut self) -> Result<Literal, String> {
        self.pos += 1;
        self.quoted().map(Literal::Bytes)
    }

    /// Bytes between double quotes, with escapes resolved.
    fn quoted(&mut self) -> Result<Vec<u8>, String> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            match self.bump() {
                None => return Err("unterminated string".to_string()),
                Some(b'"') => return Ok(out),
                Some(b'\\') => match self.bump() {
                    Some(b'\\') => out.push(b'\\'),
                    Some(b'"') => out.push(b'"'),
                    Some(b'n') => out.push(b'\n'),
                    Some(b't') => out.push(b'\t'),
                    Some(b'r') => out.push(b'\r'),
                    Some(b'x') => {
                        let hi = self.hex_digit()?;
                        let lo = self.hex_digit()?;
                        out.push(hi << 4 | lo);
                    }
                    Some(b) => return Err(format!("unknown escape \\{}", b as char)),
                    None => return Err("unterminated escape".to_string()),
                },
                Some(b) => out.push(b),
            }
        }
    }

    fn hex_digit(&mut self) -> Result<u8, String> {
        match self.bump() {
            Some(b @ b'0'..=b'9') => Ok(b - b'0'),
            Some(b @ b'a'..=b'f') => Ok(b - b'a' + 10),
            Some(b @ b'A'..=b'F') => Ok(b - b'A' + 10),
            Some(b) => Err(format!("invalid hex digit {:?}", b as char)),
            None => Err("unterminated escape".to_string()),
        }
    }

    fn sequence(&mut self, open: u8, close: u8, depth: usize) -> Result<Vec<Literal>, String> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_spaces();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(self.value(depth + 1)?);
            self.skip_spaces();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b) if b == close => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(b) => {
                    return Err(format!(
                        "expected ',' or {:?}, found {:?}",
                        close as char, b as char
                    ))
                }
                None => return Err("unterminated sequence".to_string()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
