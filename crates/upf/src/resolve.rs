//! Static type resolution of a parsed argument at a call-site PC.
//!
//! Applies the parser state to the scope tree and type catalogue: base
//! lookup, member descent, trailing calls, then the net dereference. The
//! extra `+1` dereference models the call contract: every argument is a
//! pointer to the value being printed.

use upf_dwarf::{
    ArrayType, Dwarf, Function, FunctionType, POINTER_SIZE, Type, TypeId, TypeKind,
};

use crate::error::{Error, Result};
use crate::parse::{BaseKind, ParsedArg};

/// Resolve the static type of `arg` as seen at `pc`.
///
/// # Errors
///
/// Returns the spec's fatal inference errors: unknown identifier, unknown
/// member, call of a non-function, dereference of a non-pointer, `void*`
/// left as the printable type.
pub fn resolve_argument(dwarf: &mut Dwarf<'_>, pc: u64, arg: &ParsedArg) -> Result<TypeId> {
    let units: Vec<usize> = dwarf.units_at_pc(pc).collect();

    let (mut ty, calls) = match arg.base_kind {
        BaseKind::Typename => (resolve_typename(dwarf, &units, &arg.base)?, arg.suffix_calls),
        BaseKind::Variable => (
            resolve_variable(dwarf, &units, pc, &arg.base)?,
            arg.suffix_calls,
        ),
        BaseKind::Function => {
            let callee = resolve_variable(dwarf, &units, pc, &arg.base)?;
            let returned = apply_call(dwarf, callee, &arg.base)?;
            (returned, arg.suffix_calls.saturating_sub(1))
        }
    };

    for member in &arg.members {
        ty = descend_member(dwarf, ty, member)?;
    }

    for _ in 0..calls {
        ty = apply_call(dwarf, ty, &arg.base)?;
    }

    let net = arg.deref + 1;
    if net >= 0 {
        for _ in 0..net {
            ty = strip_pointer(dwarf, ty, &arg.base)?;
        }
    } else {
        for _ in 0..-net {
            ty = dwarf.types_mut().pointer_to(ty);
        }
    }

    if matches!(dwarf.types().get(ty).kind, TypeKind::Void) {
        return Err(Error::VoidPointer(arg.base.clone()));
    }
    Ok(ty)
}

fn resolve_typename(dwarf: &mut Dwarf<'_>, units: &[usize], name: &str) -> Result<TypeId> {
    if name == "void" {
        // No CU declares a DIE for `void`; it only exists as an absent
        // pointee.
        return Ok(dwarf
            .types_mut()
            .insert_synthetic(Type::new(None, TypeKind::Void, Some(POINTER_SIZE))));
    }
    for &unit in units {
        if let Some(die) = dwarf.units()[unit].find_named_type(name) {
            return Ok(dwarf.parse_type(unit, die)?);
        }
    }
    Err(Error::UnknownIdentifier(name.to_owned()))
}

fn resolve_variable(
    dwarf: &mut Dwarf<'_>,
    units: &[usize],
    pc: u64,
    name: &str,
) -> Result<TypeId> {
    for &unit in units {
        if let Some(die) = dwarf.units()[unit].find_variable(pc, name) {
            return Ok(dwarf.parse_type(unit, die)?);
        }
    }
    // An identifier that is not a variable may still be a function; its
    // expression type is the decayed function pointer.
    for &unit in units {
        if let Some(function) = dwarf.units()[unit].find_function(name) {
            let function = function.clone();
            let fn_type = function_type(dwarf, unit, &function)?;
            return Ok(dwarf.types_mut().pointer_to(fn_type));
        }
    }
    Err(Error::UnknownIdentifier(name.to_owned()))
}

/// Build the catalogue entry for a function-table record.
fn function_type(dwarf: &mut Dwarf<'_>, unit: usize, function: &Function) -> Result<TypeId> {
    let return_type = match function.return_die {
        Some(die) => Some(dwarf.parse_type(unit, die)?),
        None => None,
    };
    let mut params = Vec::with_capacity(function.param_dies.len());
    for &die in &function.param_dies {
        params.push(dwarf.parse_type(unit, die)?);
    }
    Ok(dwarf.types_mut().insert_synthetic(Type::new(
        None,
        TypeKind::Function(FunctionType {
            return_type,
            params,
        }),
        Some(POINTER_SIZE),
    )))
}

/// Descend one `.`/`->` member, looking through pointers and arrays, and
/// substituting the return type when a function is met mid-chain.
fn descend_member(dwarf: &Dwarf<'_>, mut ty: TypeId, member: &str) -> Result<TypeId> {
    loop {
        let current = dwarf.types().get(ty);
        match &current.kind {
            TypeKind::Pointer(Some(pointee)) => ty = *pointee,
            TypeKind::Array(array) => ty = array.element,
            TypeKind::Function(function) => {
                ty = function
                    .return_type
                    .ok_or_else(|| Error::VoidCall(member.to_owned()))?;
            }
            TypeKind::Struct(record) | TypeKind::Union(record) => {
                return record
                    .members
                    .iter()
                    .find(|m| m.name == member)
                    .map(|m| m.type_id)
                    .ok_or_else(|| Error::UnknownMember {
                        member: member.to_owned(),
                        record: display_name(current),
                    });
            }
            _ => {
                return Err(Error::UnknownMember {
                    member: member.to_owned(),
                    record: display_name(current),
                });
            }
        }
    }
}

/// One `(...)` application: the type becomes the return type of the
/// (possibly pointer-to-)function.
fn apply_call(dwarf: &Dwarf<'_>, mut ty: TypeId, expr: &str) -> Result<TypeId> {
    loop {
        match &dwarf.types().get(ty).kind {
            TypeKind::Pointer(Some(pointee)) => ty = *pointee,
            TypeKind::Function(function) => {
                return function
                    .return_type
                    .ok_or_else(|| Error::VoidCall(expr.to_owned()));
            }
            _ => return Err(Error::NotAFunction(expr.to_owned())),
        }
    }
}

/// One net dereference: strip a pointer layer or an array dimension.
fn strip_pointer(dwarf: &mut Dwarf<'_>, ty: TypeId, expr: &str) -> Result<TypeId> {
    let kind = dwarf.types().get(ty).kind.clone();
    match kind {
        TypeKind::Pointer(Some(pointee)) => Ok(pointee),
        TypeKind::Pointer(None) => Err(Error::VoidPointer(expr.to_owned())),
        TypeKind::Array(array) => {
            if array.lengths.len() > 1 {
                let rest = array.lengths[1..].to_vec();
                let size = dwarf
                    .types()
                    .get(array.element)
                    .size
                    .map(|element| element * rest.iter().product::<u64>());
                Ok(dwarf.types_mut().insert_synthetic(Type::new(
                    None,
                    TypeKind::Array(ArrayType {
                        element: array.element,
                        lengths: rest,
                    }),
                    size,
                )))
            } else {
                Ok(array.element)
            }
        }
        _ => Err(Error::NotAPointer(expr.to_owned())),
    }
}

fn display_name(ty: &Type) -> String {
    ty.name.clone().unwrap_or_else(|| "<anonymous>".to_owned())
}
