use bytes::Bytes;

use super::*;

#[test]
fn test_decode_scalars() {
    assert_eq!(decode(b"i42e").unwrap(), Value::Integer(42));
    assert_eq!(decode(b"i-7e").unwrap(), Value::Integer(-7));
    assert_eq!(decode(b"i0e").unwrap(), Value::Integer(0));
    assert_eq!(decode(b"4:spam").unwrap(), Value::string("spam"));
    assert_eq!(decode(b"0:").unwrap(), Value::Bytes(Bytes::new()));
}

#[test]
fn test_decode_rejects_non_canonical_integers() {
    assert_eq!(decode(b"i-0e"), Err(BencodeError::InvalidInteger(0)));
    assert_eq!(decode(b"i03e"), Err(BencodeError::InvalidInteger(0)));
    assert_eq!(decode(b"ie"), Err(BencodeError::InvalidInteger(0)));
    assert_eq!(decode(b"i-e"), Err(BencodeError::InvalidInteger(0)));
}

#[test]
fn test_decode_nested() {
    let value = decode(b"d5:peersld2:ip8:10.0.0.14:porti6881eeee").unwrap();
    let peers = value.get(b"peers").and_then(Value::as_list).unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].get_str(b"ip"), Some("10.0.0.1"));
    assert_eq!(peers[0].get_int::<u16>(b"port"), Some(6881));
}

#[test]
fn test_decode_errors() {
    assert_eq!(decode(b"5:spam"), Err(BencodeError::UnexpectedEof(6)));
    assert_eq!(decode(b"l4:spam"), Err(BencodeError::UnexpectedEof(7)));
    assert_eq!(decode(b"i1ei2e"), Err(BencodeError::TrailingData(3)));
    assert_eq!(decode(b"di1ei2ee"), Err(BencodeError::NonStringKey(1)));
    assert_eq!(
        decode(b"x"),
        Err(BencodeError::UnexpectedByte {
            byte: b'x',
            offset: 0
        })
    );
}

#[test]
fn test_decode_depth_limit() {
    let mut data = vec![b'l'; 100];
    data.extend(vec![b'e'; 100]);
    assert_eq!(decode(&data), Err(BencodeError::NestingTooDeep));
}

#[test]
fn test_encode_sorts_keys() {
    let value = DictBuilder::new()
        .entry("zeta", 1i64)
        .entry("alpha", "x")
        .entry_opt("missing", None::<i64>)
        .build();
    assert_eq!(encode(&value), b"d5:alpha1:x4:zetai1ee");
}

#[test]
fn test_get_int_out_of_range() {
    let value = decode(b"d4:porti70000ee").unwrap();
    assert_eq!(value.get_int::<u16>(b"port"), None);
    assert_eq!(value.get_int::<u32>(b"port"), Some(70000));
}
