//! Native variadic calls against the C library of the test process.
#![cfg(unix)]

use sai_loader::marshal::{MutableByteString, NativeCallee, VariadicFunction};
use sai_loader::{CType, CValue, Lookup, MarshalError, Platform};

fn snprintf(lookup: &Lookup) -> VariadicFunction<NativeCallee> {
    let symbol = lookup.symbol("snprintf").unwrap();
    let callee = unsafe { NativeCallee::new(symbol) }.unwrap();
    VariadicFunction::new(
        callee,
        vec![CType::VoidPtr, CType::ULong, CType::CharPtr],
        CType::I32,
    )
}

#[test]
fn test_snprintf_formats_trailing_arguments() {
    let lookup = Lookup::current_process(Platform::Posix).unwrap();
    let function = snprintf(&lookup);
    let mut buf = MutableByteString::new(vec![0u8; 32]);
    let ptr = buf.as_mut_ptr();

    let written = function
        .call(&[
            CValue::from(ptr),
            CValue::from(buf.len()),
            CValue::from("%ld-%s"),
            CValue::Int(42),
            CValue::from("sai"),
        ])
        .unwrap();

    assert_eq!(written, CValue::Int(6));
    assert_eq!(MutableByteString::from_c_array(buf.as_bytes()).as_bytes(), b"42-sai");
}

#[test]
fn test_fixed_prefix_checked_before_call() {
    let lookup = Lookup::current_process(Platform::Posix).unwrap();
    let function = snprintf(&lookup);

    let err = function
        .call(&[CValue::Null, CValue::Int(-1), CValue::from("%d")])
        .unwrap_err();
    assert!(matches!(err, MarshalError::OutOfRange { index: 1, .. }));
}

#[test]
fn test_snprintf_float_and_many_trailing_arguments() {
    let lookup = Lookup::current_process(Platform::Posix).unwrap();
    let function = snprintf(&lookup);
    let mut buf = MutableByteString::new(vec![0u8; 64]);
    let ptr = buf.as_mut_ptr();

    let mut args = vec![
        CValue::from(ptr),
        CValue::from(buf.len()),
        CValue::from("%.1f %ld %ld %ld %ld %ld %ld %ld"),
        CValue::Float(1.5),
    ];
    args.extend((1..=7).map(CValue::Int));
    let written = function.call(&args).unwrap();

    assert_eq!(written, CValue::Int(17));
    assert_eq!(
        MutableByteString::from_c_array(buf.as_bytes()).as_bytes(),
        b"1.5 1 2 3 4 5 6 7"
    );
}

#[test]
fn test_double_return() {
    let lookup = Lookup::current_process(Platform::Posix).unwrap();
    let symbol = lookup.symbol("strtod").unwrap();
    let callee = unsafe { NativeCallee::new(symbol) }.unwrap();
    let function = VariadicFunction::new(
        callee,
        vec![CType::CharPtr, CType::pointer_to(CType::CharPtr)],
        CType::Double,
    );

    let value = function.call(&[CValue::from("2.5"), CValue::Null]).unwrap();
    assert_eq!(value, CValue::Float(2.5));
}
