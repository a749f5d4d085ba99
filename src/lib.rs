/*!
A driver library for the Akai Fire, talking to the hardware over raw MIDI:
the 4x16 RGB pad grid, the buttons and their LEDs, the touch-sensitive
rotary encoders, and the 128x64 monochrome OLED.

The crate is layered:
- [`Screen`] is a pure in-memory canvas with drawing primitives, renderable
  to the device or to a BMP file
- [`fire::Input`]/[`fire::Output`] give message-level access to the protocol
- [`Fire`] wraps both in a session with callback-based event dispatch

# Example

```no_run
use fiery::{Event, Fire, PadColor};

let mut fire = Fire::guess()?;

fire.add_global_listener(|event| {
    if let Event::PadPressed { index, velocity } = *event {
        println!("pad {} hit at velocity {}", index, velocity);
    }
});

fire.set_pad_color(0, PadColor::RED)?;
fire.screen_mut().draw_text("Hello Fire", 24, 28, true);
fire.render_screen()?;

std::thread::park(); // keep the listeners running
# Ok::<(), fiery::Error>(())
```

The listener layer is optional; for a plain receive loop use
[`InputDevice::guess_polling`] and iterate the returned handler.
*/

/// The name this library identifies itself with to the MIDI backend
const APPLICATION_NAME: &str = "fiery";

mod util;

mod errors;
pub use errors::*;

mod midi_io;
pub use midi_io::*;

pub mod fire;
pub use fire::*;

pub mod screen;
pub use screen::*;
