//! A basic `no_std` loader that's used to ballpark estimate how large the
//! applier's binary footprint is in resource-restricted environments.
//!
//! Reads a patch stream on stdin, relocates it into a fixed RAM window, and
//! dumps the window to stdout.

#![no_std]
#![no_main]

use relopatch::apply::{Applier, ApplyError, LoadError, DEFAULT_COMMAND_BUFFER_SIZE};
use relopatch::target::SliceTarget;

mod conn;
mod print_str;

use crate::print_str::print_str;

/// Where the image ends up at runtime, relative to its link address.
const LOAD_OFFSET: u32 = 0x0001_0000;

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo<'_>) -> ! {
    loop {}
}

fn rust_main() -> Result<(), i32> {
    print_str("Running loader_no_std...");

    let mut conn = conn::FdConnection::stdin();

    let mut window = [0; 0x4000];
    let mut target = SliceTarget::new(&mut window);

    // must hold the largest command the encoder emits
    let mut cmdbuf = [0; DEFAULT_COMMAND_BUFFER_SIZE];
    let mut applier = Applier::builder(LOAD_OFFSET)
        .with_command_buffer(&mut cmdbuf)
        .require_end(true)
        .build()
        .map_err(|_| 1)?;

    match applier.run_blocking(&mut target, &mut conn) {
        Ok(_summary) => print_str("Image loaded"),
        Err(LoadError::ConnectionRead(e)) => {
            print_str("could not read patch stream:");
            print_str(e);
            return Err(2);
        }
        Err(LoadError::Apply(ApplyError::TargetError(_e))) => {
            print_str("image does not fit in the load window");
            return Err(3);
        }
        Err(LoadError::Apply(_e)) => {
            print_str("malformed patch stream");
            return Err(4);
        }
    }

    let image = target.as_slice();
    unsafe {
        libc::write(1, image.as_ptr() as _, image.len());
    }

    Ok(())
}

#[no_mangle]
extern "C" fn main(_argc: isize, _argv: *const *const u8) -> isize {
    if let Err(e) = rust_main() {
        return e as isize;
    }

    0
}
