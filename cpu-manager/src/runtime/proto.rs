//! Generated client stubs for `runtime.v1`, compiled by `build.rs`.

tonic::include_proto!("runtime.v1");
