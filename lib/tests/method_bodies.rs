use classgen::ast::*;
use classgen::jvm::class_file::{
    ClassConstantIndex, ClassFile, Code, ConstantIndex, StackMapFrame, StackMapTable,
};
use classgen::jvm::code::decode_instructions;
use classgen::jvm::verifier::VerificationType;
use classgen::jvm::{
    self, BinaryName, ClassAccessFlags, FieldAccessFlags, FieldRef, FieldType, MethodAccessFlags,
    MethodDescriptor, MethodRef, Name, UnqualifiedName,
};
use classgen::translate::{translate_class, Error, Settings};

fn name(name: &str) -> UnqualifiedName {
    UnqualifiedName::from_string(name.to_string()).unwrap()
}

fn sample_class(fields: Vec<FieldDecl>, methods: Vec<MethodDecl>) -> ClassDecl {
    ClassDecl {
        name: BinaryName::from_string("test/Sample".to_string()).unwrap(),
        super_class: BinaryName::OBJECT,
        interfaces: vec![],
        access_flags: ClassAccessFlags::PUBLIC,
        source_file: Some("Sample.java".to_string()),
        fields,
        methods,
    }
}

/// Method whose parameters are locals `0`, `1`, ... in order
fn method(
    method_name: &str,
    is_static: bool,
    parameters: Vec<FieldType>,
    return_type: Option<FieldType>,
    body: Vec<Stmt>,
) -> MethodDecl {
    let mut access_flags = MethodAccessFlags::PUBLIC;
    if is_static {
        access_flags |= MethodAccessFlags::STATIC;
    }
    MethodDecl {
        name: name(method_name),
        access_flags,
        parameters: parameters
            .into_iter()
            .enumerate()
            .map(|(local, param_type)| Parameter {
                local: LocalId(local),
                param_type,
            })
            .collect(),
        return_type,
        body: Block(body),
    }
}

/// Generate the class, then read it back from its serialized form
fn generate(class: &ClassDecl) -> ClassFile {
    let class_file = translate_class(&Settings::default(), class).unwrap();
    let bytes = class_file.to_bytes().unwrap();
    ClassFile::parse(&bytes).unwrap()
}

fn code_of(class: &ClassFile, method_name: &str, descriptor: &str) -> Code {
    let method = class.method(method_name, descriptor).unwrap();
    class.method_code(method).unwrap().unwrap()
}

fn stack_map(class: &ClassFile, code: &Code) -> Vec<StackMapFrame> {
    class
        .find_attribute::<StackMapTable>(&code.attributes)
        .unwrap()
        .map_or(vec![], |table| table.0)
}

fn mnemonics(code: &Code) -> Vec<&'static str> {
    decode_instructions(&code.code_array.0)
        .unwrap()
        .iter()
        .map(|instruction| instruction.opcode.mnemonic)
        .collect()
}

fn int_local(local: usize) -> Expr {
    Expr::local(LocalId(local), FieldType::int())
}

fn stmt(kind: ExprKind, expr_type: FieldType) -> Stmt {
    Stmt::Expr(Expr::new(kind, expr_type))
}

#[test]
fn if_else_assigning_a_local() {
    // static int pick(boolean b) { int x = 0; if (b) x = 1; else x = 2; return x; }
    let pick = method(
        "pick",
        true,
        vec![FieldType::boolean()],
        Some(FieldType::int()),
        vec![
            Stmt::LocalDecl {
                local: LocalId(1),
                local_type: FieldType::int(),
                initializer: Some(Expr::int(0)),
            },
            Stmt::If {
                condition: Expr::local(LocalId(0), FieldType::boolean()),
                then_branch: Box::new(Stmt::Expr(Expr::assign(int_local(1), Expr::int(1)))),
                else_branch: Some(Box::new(Stmt::Expr(Expr::assign(
                    int_local(1),
                    Expr::int(2),
                )))),
            },
            Stmt::Return(Some(int_local(1))),
        ],
    );
    let class = generate(&sample_class(vec![], vec![pick]));
    let code = code_of(&class, "pick", "(Z)I");

    assert_eq!(
        code.code_array.0,
        vec![
            0x03, // iconst_0
            0x3c, // istore_1
            0x1a, // iload_0
            0x99, 0x00, 0x08, // ifeq 11
            0x04, // iconst_1
            0x3c, // istore_1
            0xa7, 0x00, 0x05, // goto 13
            0x05, // iconst_2
            0x3c, // istore_1
            0x1b, // iload_1
            0xac, // ireturn
        ]
    );
    assert_eq!(code.max_stack, 1);
    assert_eq!(code.max_locals, 2);
    assert_eq!(
        stack_map(&class, &code),
        vec![
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 11,
                locals: vec![VerificationType::Integer],
            },
            StackMapFrame::SameLocalsNoStack { offset_delta: 1 },
        ]
    );
}

#[test]
fn nested_ifs_returning() {
    // static int sign(int n) { if (n > 0) { if (n > 100) return 2; return 1; } return 0; }
    let sign = method(
        "sign",
        true,
        vec![FieldType::int()],
        Some(FieldType::int()),
        vec![
            Stmt::If {
                condition: Expr::compare(CompareOp::Gt, int_local(0), Expr::int(0)),
                then_branch: Box::new(Stmt::Block(Block(vec![
                    Stmt::If {
                        condition: Expr::compare(CompareOp::Gt, int_local(0), Expr::int(100)),
                        then_branch: Box::new(Stmt::Return(Some(Expr::int(2)))),
                        else_branch: None,
                    },
                    Stmt::Return(Some(Expr::int(1))),
                ]))),
                else_branch: None,
            },
            Stmt::Return(Some(Expr::int(0))),
        ],
    );
    let class = generate(&sample_class(vec![], vec![sign]));
    let code = code_of(&class, "sign", "(I)I");

    assert_eq!(
        code.code_array.0,
        vec![
            0x1a, // iload_0
            0x9e, 0x00, 0x0d, // ifle 14
            0x1a, // iload_0
            0x10, 0x64, // bipush 100
            0xa4, 0x00, 0x05, // if_icmple 12
            0x05, // iconst_2
            0xac, // ireturn
            0x04, // iconst_1
            0xac, // ireturn
            0x03, // iconst_0
            0xac, // ireturn
        ]
    );
    assert_eq!(
        stack_map(&class, &code),
        vec![
            StackMapFrame::SameLocalsNoStack { offset_delta: 12 },
            StackMapFrame::SameLocalsNoStack { offset_delta: 1 },
        ]
    );
}

#[test]
fn deeply_nested_ifs_share_one_frame() {
    // static void f(int a, int b, int c) {
    //     if (a > 0) { if (b > 0) { if (c > 0) { a = 1; } } }
    //     return;
    // }
    let innermost = Stmt::If {
        condition: Expr::compare(CompareOp::Gt, int_local(2), Expr::int(0)),
        then_branch: Box::new(Stmt::Block(Block(vec![Stmt::Expr(Expr::assign(
            int_local(0),
            Expr::int(1),
        ))]))),
        else_branch: None,
    };
    let middle = Stmt::If {
        condition: Expr::compare(CompareOp::Gt, int_local(1), Expr::int(0)),
        then_branch: Box::new(Stmt::Block(Block(vec![innermost]))),
        else_branch: None,
    };
    let outer = Stmt::If {
        condition: Expr::compare(CompareOp::Gt, int_local(0), Expr::int(0)),
        then_branch: Box::new(Stmt::Block(Block(vec![middle]))),
        else_branch: None,
    };
    let f = method(
        "f",
        true,
        vec![FieldType::int(), FieldType::int(), FieldType::int()],
        None,
        vec![outer, Stmt::Return(None)],
    );
    let class = generate(&sample_class(vec![], vec![f]));
    let code = code_of(&class, "f", "(III)V");

    assert_eq!(
        code.code_array.0,
        vec![
            0x1a, // iload_0
            0x9e, 0x00, 0x0d, // ifle 14
            0x1b, // iload_1
            0x9e, 0x00, 0x09, // ifle 14
            0x1c, // iload_2
            0x9e, 0x00, 0x05, // ifle 14
            0x04, // iconst_1
            0x3b, // istore_0
            0xb1, // return
        ]
    );
    assert_eq!(
        stack_map(&class, &code),
        vec![StackMapFrame::SameLocalsNoStack { offset_delta: 14 }]
    );
}

#[test]
fn while_loop_jumps_back_to_its_head() {
    // static int count(int n) { int i = 0; while (i < n) { i++; } return i; }
    let count = method(
        "count",
        true,
        vec![FieldType::int()],
        Some(FieldType::int()),
        vec![
            Stmt::LocalDecl {
                local: LocalId(1),
                local_type: FieldType::int(),
                initializer: Some(Expr::int(0)),
            },
            Stmt::While {
                label: None,
                condition: Expr::compare(CompareOp::Lt, int_local(1), int_local(0)),
                body: Box::new(Stmt::Block(Block(vec![stmt(
                    ExprKind::Increment {
                        target: Box::new(int_local(1)),
                        decrement: false,
                        prefix: false,
                    },
                    FieldType::int(),
                )]))),
            },
            Stmt::Return(Some(int_local(1))),
        ],
    );
    let class = generate(&sample_class(vec![], vec![count]));
    let code = code_of(&class, "count", "(I)I");

    assert_eq!(
        code.code_array.0,
        vec![
            0x03, // iconst_0
            0x3c, // istore_1
            0x1b, // iload_1
            0x1a, // iload_0
            0xa2, 0x00, 0x09, // if_icmpge 13
            0x84, 0x01, 0x01, // iinc 1 1
            0xa7, 0xff, 0xf8, // goto 2
            0x1b, // iload_1
            0xac, // ireturn
        ]
    );
    assert_eq!(
        stack_map(&class, &code),
        vec![
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 2,
                locals: vec![VerificationType::Integer],
            },
            StackMapFrame::SameLocalsNoStack { offset_delta: 10 },
        ]
    );
}

#[test]
fn comparison_as_a_value() {
    // static boolean isPositive(int n) { return n > 0; }
    let is_positive = method(
        "isPositive",
        true,
        vec![FieldType::int()],
        Some(FieldType::boolean()),
        vec![Stmt::Return(Some(Expr::compare(
            CompareOp::Gt,
            int_local(0),
            Expr::int(0),
        )))],
    );
    let class = generate(&sample_class(vec![], vec![is_positive]));
    let code = code_of(&class, "isPositive", "(I)Z");

    assert_eq!(
        code.code_array.0,
        vec![
            0x1a, // iload_0
            0x9e, 0x00, 0x07, // ifle 8
            0x04, // iconst_1
            0xa7, 0x00, 0x04, // goto 9
            0x03, // iconst_0
            0xac, // ireturn
        ]
    );
    assert_eq!(
        stack_map(&class, &code),
        vec![
            StackMapFrame::SameLocalsNoStack { offset_delta: 8 },
            StackMapFrame::SameLocalsOneStack {
                offset_delta: 0,
                stack: VerificationType::Integer,
            },
        ]
    );
}

#[test]
fn short_circuit_and() {
    // static int both(int a, int b) { if (a > 0 && b > 0) return 1; return 0; }
    let both = method(
        "both",
        true,
        vec![FieldType::int(), FieldType::int()],
        Some(FieldType::int()),
        vec![
            Stmt::If {
                condition: Expr::new(
                    ExprKind::Logical {
                        op: LogicalOp::And,
                        left: Box::new(Expr::compare(CompareOp::Gt, int_local(0), Expr::int(0))),
                        right: Box::new(Expr::compare(CompareOp::Gt, int_local(1), Expr::int(0))),
                    },
                    FieldType::boolean(),
                ),
                then_branch: Box::new(Stmt::Return(Some(Expr::int(1)))),
                else_branch: None,
            },
            Stmt::Return(Some(Expr::int(0))),
        ],
    );
    let class = generate(&sample_class(vec![], vec![both]));
    let code = code_of(&class, "both", "(II)I");

    assert_eq!(
        mnemonics(&code),
        vec!["iload_0", "ifle", "iload_1", "ifle", "iconst_1", "ireturn", "iconst_0", "ireturn"]
    );
    assert_eq!(
        stack_map(&class, &code),
        vec![StackMapFrame::SameLocalsNoStack { offset_delta: 10 }]
    );
}

#[test]
fn float_comparisons_pick_the_nan_safe_instruction() {
    // static boolean lt(float a, float b) { return a < b; }
    let lt = method(
        "lt",
        true,
        vec![FieldType::float(), FieldType::float()],
        Some(FieldType::boolean()),
        vec![Stmt::Return(Some(Expr::compare(
            CompareOp::Lt,
            Expr::local(LocalId(0), FieldType::float()),
            Expr::local(LocalId(1), FieldType::float()),
        )))],
    );
    let class = generate(&sample_class(vec![], vec![lt]));
    let code = code_of(&class, "lt", "(FF)Z");

    assert_eq!(
        mnemonics(&code),
        vec!["fload_0", "fload_1", "fcmpg", "ifge", "iconst_1", "goto", "iconst_0", "ireturn"]
    );
}

#[test]
fn ints_widen_where_floats_are_expected() {
    let i = || int_local(0);
    let half = MethodRef::static_method(
        BinaryName::from_string("test/Sample".to_string()).unwrap(),
        name("half"),
        MethodDescriptor {
            parameters: vec![FieldType::float()],
            return_type: Some(FieldType::float()),
        },
    );

    // static float plus(int i) { return i + 1.5f; }
    let plus = method(
        "plus",
        true,
        vec![FieldType::int()],
        Some(FieldType::float()),
        vec![Stmt::Return(Some(Expr::binary(
            BinaryOp::Add,
            i(),
            Expr::float(1.5),
            FieldType::float(),
        )))],
    );

    // static boolean below(float f) { return f < 1; }
    let below = method(
        "below",
        true,
        vec![FieldType::float()],
        Some(FieldType::boolean()),
        vec![Stmt::Return(Some(Expr::compare(
            CompareOp::Lt,
            Expr::local(LocalId(0), FieldType::float()),
            Expr::int(1),
        )))],
    );

    // static float one() { float f = 1; return f; }
    let one = method(
        "one",
        true,
        vec![],
        Some(FieldType::float()),
        vec![
            Stmt::LocalDecl {
                local: LocalId(0),
                local_type: FieldType::float(),
                initializer: Some(Expr::int(1)),
            },
            Stmt::Return(Some(Expr::local(LocalId(0), FieldType::float()))),
        ],
    );

    // static float same(int i) { return i; }
    let same = method(
        "same",
        true,
        vec![FieldType::int()],
        Some(FieldType::float()),
        vec![Stmt::Return(Some(i()))],
    );

    // static float three() { return half(3); }
    let three = method(
        "three",
        true,
        vec![],
        Some(FieldType::float()),
        vec![Stmt::Return(Some(Expr::new(
            ExprKind::Call {
                receiver: None,
                method: half,
                arguments: vec![Expr::int(3)],
                via_super: false,
            },
            FieldType::float(),
        )))],
    );

    let class = generate(&sample_class(vec![], vec![plus, below, one, same, three]));
    assert_eq!(
        mnemonics(&code_of(&class, "plus", "(I)F")),
        vec!["iload_0", "i2f", "ldc", "fadd", "freturn"]
    );
    assert_eq!(
        mnemonics(&code_of(&class, "below", "(F)Z")),
        vec![
            "fload_0", "iconst_1", "i2f", "fcmpg", "ifge", "iconst_1", "goto", "iconst_0",
            "ireturn"
        ]
    );
    assert_eq!(
        mnemonics(&code_of(&class, "one", "()F")),
        vec!["iconst_1", "i2f", "fstore_0", "fload_0", "freturn"]
    );
    assert_eq!(
        mnemonics(&code_of(&class, "same", "(I)F")),
        vec!["iload_0", "i2f", "freturn"]
    );
    assert_eq!(
        mnemonics(&code_of(&class, "three", "()F")),
        vec!["iconst_3", "i2f", "invokestatic", "freturn"]
    );
}

#[test]
fn labeled_for_loop_then_do_while() {
    // static int scan(int[] a) {
    //     int found = 0;
    //     outer: for (int i = 0; i < a.length; i++) {
    //         int v = a[i];
    //         if (v == 0) continue;
    //         if (v < 0) break outer;
    //         found += v;
    //     }
    //     do { found--; } while (found > 10);
    //     return found;
    // }
    let int_array = FieldType::array(FieldType::int());
    let a = || Expr::local(LocalId(0), int_array.clone());
    let found = || int_local(1);
    let i = || int_local(2);
    let v = || int_local(3);

    let body = Stmt::Block(Block(vec![
        Stmt::LocalDecl {
            local: LocalId(3),
            local_type: FieldType::int(),
            initializer: Some(Expr::new(
                ExprKind::ArrayElement {
                    array: Box::new(a()),
                    index: Box::new(i()),
                },
                FieldType::int(),
            )),
        },
        Stmt::If {
            condition: Expr::compare(CompareOp::Eq, v(), Expr::int(0)),
            then_branch: Box::new(Stmt::Continue(None)),
            else_branch: None,
        },
        Stmt::If {
            condition: Expr::compare(CompareOp::Lt, v(), Expr::int(0)),
            then_branch: Box::new(Stmt::Break(Some("outer".to_string()))),
            else_branch: None,
        },
        stmt(
            ExprKind::CompoundAssign {
                op: BinaryOp::Add,
                target: Box::new(found()),
                value: Box::new(v()),
            },
            FieldType::int(),
        ),
    ]));
    let for_loop = Stmt::For {
        label: Some("outer".to_string()),
        init: vec![Stmt::LocalDecl {
            local: LocalId(2),
            local_type: FieldType::int(),
            initializer: Some(Expr::int(0)),
        }],
        condition: Some(Expr::compare(
            CompareOp::Lt,
            i(),
            Expr::new(ExprKind::ArrayLength(Box::new(a())), FieldType::int()),
        )),
        update: vec![Expr::new(
            ExprKind::Increment {
                target: Box::new(i()),
                decrement: false,
                prefix: false,
            },
            FieldType::int(),
        )],
        body: Box::new(body),
    };
    let do_while = Stmt::DoWhile {
        label: None,
        body: Box::new(stmt(
            ExprKind::Increment {
                target: Box::new(found()),
                decrement: true,
                prefix: false,
            },
            FieldType::int(),
        )),
        condition: Expr::compare(CompareOp::Gt, found(), Expr::int(10)),
    };
    let scan = method(
        "scan",
        true,
        vec![int_array.clone()],
        Some(FieldType::int()),
        vec![
            Stmt::LocalDecl {
                local: LocalId(1),
                local_type: FieldType::int(),
                initializer: Some(Expr::int(0)),
            },
            for_loop,
            do_while,
            Stmt::Return(Some(found())),
        ],
    );
    let class = generate(&sample_class(vec![], vec![scan]));
    let code = code_of(&class, "scan", "([I)I");

    assert_eq!(
        code.code_array.0,
        vec![
            0x03, // iconst_0
            0x3c, // istore_1
            0x03, // iconst_0
            0x3d, // istore_2
            0x1c, // 4: iload_2
            0x2a, // aload_0
            0xbe, // arraylength
            0xa2, 0x00, 0x1f, // if_icmpge 38
            0x2a, // aload_0
            0x1c, // iload_2
            0x2e, // iaload
            0x3e, // istore_3
            0x1d, // iload_3
            0x9a, 0x00, 0x06, // ifne 21
            0xa7, 0x00, 0x0e, // goto 32
            0x1d, // 21: iload_3
            0x9c, 0x00, 0x06, // ifge 28
            0xa7, 0x00, 0x0d, // goto 38
            0x1b, // 28: iload_1
            0x1d, // iload_3
            0x60, // iadd
            0x3c, // istore_1
            0x84, 0x02, 0x01, // 32: iinc 2 1
            0xa7, 0xff, 0xe1, // goto 4
            0x84, 0x01, 0xff, // 38: iinc 1 -1
            0x1b, // iload_1
            0x10, 0x0a, // bipush 10
            0xa3, 0xff, 0xfa, // if_icmpgt 38
            0x1b, // iload_1
            0xac, // ireturn
        ]
    );
    assert_eq!(code.max_stack, 2);
    assert_eq!(code.max_locals, 4);
    assert_eq!(
        stack_map(&class, &code),
        vec![
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 4,
                locals: vec![VerificationType::Integer, VerificationType::Integer],
            },
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 16,
                locals: vec![VerificationType::Integer],
            },
            StackMapFrame::SameLocalsNoStack { offset_delta: 6 },
            StackMapFrame::ChopLocalsNoStack {
                offset_delta: 3,
                chopped_k: 1,
            },
            StackMapFrame::ChopLocalsNoStack {
                offset_delta: 5,
                chopped_k: 1,
            },
        ]
    );
}

#[test]
fn array_element_compound_assignment() {
    // static int add(int[] a, int i, int[][] m) { return a[i] += m[1][0]; }
    let int_array = FieldType::array(FieldType::int());
    let matrix = FieldType::array(int_array.clone());
    let element = |array: Expr, index: Expr, element_type: FieldType| {
        Expr::new(
            ExprKind::ArrayElement {
                array: Box::new(array),
                index: Box::new(index),
            },
            element_type,
        )
    };
    let target = element(
        Expr::local(LocalId(0), int_array.clone()),
        int_local(1),
        FieldType::int(),
    );
    let value = element(
        element(
            Expr::local(LocalId(2), matrix.clone()),
            Expr::int(1),
            int_array.clone(),
        ),
        Expr::int(0),
        FieldType::int(),
    );
    let add = method(
        "add",
        true,
        vec![int_array, FieldType::int(), matrix],
        Some(FieldType::int()),
        vec![Stmt::Return(Some(Expr::new(
            ExprKind::CompoundAssign {
                op: BinaryOp::Add,
                target: Box::new(target),
                value: Box::new(value),
            },
            FieldType::int(),
        )))],
    );
    let class = generate(&sample_class(vec![], vec![add]));
    let code = code_of(&class, "add", "([II[[I)I");

    assert_eq!(
        mnemonics(&code),
        vec![
            "aload_0", "iload_1", "dup2", "iaload", "aload_2", "iconst_1", "aaload", "iconst_0",
            "iaload", "iadd", "dup_x2", "iastore", "ireturn",
        ]
    );
    assert_eq!(code.max_stack, 5);
    assert!(stack_map(&class, &code).is_empty());
}

#[test]
fn array_initializers_and_multi_dimensional_arrays() {
    let int_array = FieldType::array(FieldType::int());
    let grid_type = FieldType::array(int_array.clone());

    // static int[][] grid() { return new int[][] { { 1, 2 }, { } }; }
    let grid = method(
        "grid",
        true,
        vec![],
        Some(grid_type.clone()),
        vec![Stmt::Return(Some(Expr::new(
            ExprKind::ArrayInit(vec![
                Expr::new(
                    ExprKind::ArrayInit(vec![Expr::int(1), Expr::int(2)]),
                    int_array.clone(),
                ),
                Expr::new(ExprKind::ArrayInit(vec![]), int_array),
            ]),
            grid_type,
        )))],
    );

    // static float[][][] cube() { return new float[3][4][]; }
    let cube_type = FieldType::array(FieldType::array(FieldType::array(FieldType::float())));
    let cube = method(
        "cube",
        true,
        vec![],
        Some(cube_type.clone()),
        vec![Stmt::Return(Some(Expr::new(
            ExprKind::NewArray {
                dimensions: vec![Expr::int(3), Expr::int(4)],
            },
            cube_type,
        )))],
    );

    let class = generate(&sample_class(vec![], vec![grid, cube]));

    let code = code_of(&class, "grid", "()[[I");
    assert_eq!(
        mnemonics(&code),
        vec![
            "iconst_2", "anewarray", "dup", "iconst_0", "iconst_2", "newarray", "dup", "iconst_0",
            "iconst_1", "iastore", "dup", "iconst_1", "iconst_2", "iastore", "aastore", "dup",
            "iconst_1", "iconst_0", "newarray", "aastore", "areturn",
        ]
    );
    assert_eq!(code.max_stack, 7);

    let code = code_of(&class, "cube", "()[[[F");
    assert_eq!(
        mnemonics(&code),
        vec!["iconst_3", "iconst_4", "multianewarray", "areturn"]
    );
    let instructions = decode_instructions(&code.code_array.0).unwrap();
    let operands = &instructions[2].operands;
    let array_class = ClassConstantIndex(ConstantIndex(u16::from_be_bytes([
        operands[0],
        operands[1],
    ])));
    assert_eq!(class.class_name(array_class), Some("[[[F"));
    assert_eq!(operands[2], 2);
}

#[test]
fn field_increments() {
    let class_name = BinaryName::from_string("test/Sample".to_string()).unwrap();
    let count = FieldRef {
        class: class_name.clone(),
        name: name("count"),
        descriptor: FieldType::int(),
        is_static: false,
    };
    let this_count = || {
        Expr::new(
            ExprKind::Field {
                object: Box::new(Expr::new(ExprKind::This, FieldType::object(class_name.clone()))),
                field: count.clone(),
            },
            FieldType::int(),
        )
    };
    let increment = |prefix: bool| {
        Expr::new(
            ExprKind::Increment {
                target: Box::new(this_count()),
                decrement: false,
                prefix,
            },
            FieldType::int(),
        )
    };

    // void bump() { this.count++; }
    let bump = method("bump", false, vec![], None, vec![Stmt::Expr(increment(false))]);

    // int post() { return this.count++; }
    let post = method(
        "post",
        false,
        vec![],
        Some(FieldType::int()),
        vec![Stmt::Return(Some(increment(false)))],
    );

    // int pre() { return ++this.count; }
    let pre = method(
        "pre",
        false,
        vec![],
        Some(FieldType::int()),
        vec![Stmt::Return(Some(increment(true)))],
    );

    let fields = vec![FieldDecl {
        name: name("count"),
        field_type: FieldType::int(),
        access_flags: FieldAccessFlags::PRIVATE,
    }];
    let class = generate(&sample_class(fields, vec![bump, post, pre]));

    let code = code_of(&class, "bump", "()V");
    assert_eq!(
        mnemonics(&code),
        vec!["aload_0", "dup", "getfield", "iconst_1", "iadd", "putfield", "return"]
    );
    assert_eq!(code.max_stack, 3);

    let code = code_of(&class, "post", "()I");
    assert_eq!(
        mnemonics(&code),
        vec!["aload_0", "dup", "getfield", "dup_x1", "iconst_1", "iadd", "putfield", "ireturn"]
    );
    assert_eq!(code.max_stack, 4);

    let code = code_of(&class, "pre", "()I");
    assert_eq!(
        mnemonics(&code),
        vec!["aload_0", "dup", "getfield", "iconst_1", "iadd", "dup_x1", "putfield", "ireturn"]
    );
}

#[test]
fn string_concatenation_shares_one_builder() {
    // static String greet(String who) { return "Hello, " + who + "!"; }
    let who = Expr::local(LocalId(0), FieldType::string());
    let greeting = Expr::binary(
        BinaryOp::Add,
        Expr::binary(BinaryOp::Add, Expr::string("Hello, "), who, FieldType::string()),
        Expr::string("!"),
        FieldType::string(),
    );
    let greet = method(
        "greet",
        true,
        vec![FieldType::string()],
        Some(FieldType::string()),
        vec![Stmt::Return(Some(greeting))],
    );
    let class = generate(&sample_class(vec![], vec![greet]));
    let code = code_of(&class, "greet", "(Ljava/lang/String;)Ljava/lang/String;");

    assert_eq!(
        mnemonics(&code),
        vec![
            "new",
            "dup",
            "invokespecial",
            "ldc",
            "invokevirtual",
            "aload_0",
            "invokevirtual",
            "ldc",
            "invokevirtual",
            "invokevirtual",
            "areturn",
        ]
    );
    assert_eq!(code.max_stack, 2);
    assert!(stack_map(&class, &code).is_empty());
}

#[test]
fn conditional_joining_null_and_a_string() {
    // static String orEmpty(String s) { return s == null ? "" : s; }
    let s = || Expr::local(LocalId(0), FieldType::string());
    let null = Expr::new(ExprKind::Null, FieldType::string());
    let or_empty = method(
        "orEmpty",
        true,
        vec![FieldType::string()],
        Some(FieldType::string()),
        vec![Stmt::Return(Some(Expr::new(
            ExprKind::Conditional {
                condition: Box::new(Expr::compare(CompareOp::Eq, s(), null)),
                then_value: Box::new(Expr::string("")),
                else_value: Box::new(s()),
            },
            FieldType::string(),
        )))],
    );
    let class = generate(&sample_class(vec![], vec![or_empty]));
    let code = code_of(&class, "orEmpty", "(Ljava/lang/String;)Ljava/lang/String;");

    assert_eq!(
        mnemonics(&code),
        vec!["aload_0", "ifnonnull", "ldc", "goto", "aload_0", "areturn"]
    );
    let frames = stack_map(&class, &code);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], StackMapFrame::SameLocalsNoStack { offset_delta: 9 });
    assert!(matches!(
        frames[1],
        StackMapFrame::SameLocalsOneStack {
            offset_delta: 0,
            stack: VerificationType::Object(_),
        }
    ));
}

#[test]
fn sibling_blocks_reuse_slots() {
    // static void f() { { int a = 1; } { float b = 2.0f; } }
    let f = method(
        "f",
        true,
        vec![],
        None,
        vec![
            Stmt::Block(Block(vec![Stmt::LocalDecl {
                local: LocalId(0),
                local_type: FieldType::int(),
                initializer: Some(Expr::int(1)),
            }])),
            Stmt::Block(Block(vec![Stmt::LocalDecl {
                local: LocalId(1),
                local_type: FieldType::float(),
                initializer: Some(Expr::float(2.0)),
            }])),
        ],
    );
    let class = generate(&sample_class(vec![], vec![f]));
    let code = code_of(&class, "f", "()V");

    assert_eq!(code.code_array.0, vec![0x04, 0x3b, 0x0d, 0x43, 0xb1]);
    assert_eq!(code.max_locals, 1);
    assert!(code.attributes.is_empty());
}

#[test]
fn constructors_call_the_superclass() {
    let constructor = MethodDecl {
        name: UnqualifiedName::INIT,
        access_flags: MethodAccessFlags::PUBLIC,
        parameters: vec![],
        return_type: None,
        body: Block::default(),
    };
    let class = generate(&sample_class(vec![], vec![constructor]));
    let code = code_of(&class, "<init>", "()V");

    assert_eq!(mnemonics(&code), vec!["aload_0", "invokespecial", "return"]);
    assert_eq!(code.max_stack, 1);
    assert_eq!(code.max_locals, 1);
}

#[test]
fn oversized_methods_are_reported_together() {
    let mut body = vec![Stmt::LocalDecl {
        local: LocalId(0),
        local_type: FieldType::int(),
        initializer: None,
    }];
    for _ in 0..20_000 {
        // sipush 1000; istore_0
        body.push(Stmt::Expr(Expr::assign(int_local(0), Expr::int(1000))));
    }
    let big = method("big", true, vec![], None, body);
    let small = method("small", true, vec![], None, vec![]);

    match translate_class(&Settings::default(), &sample_class(vec![], vec![small, big])) {
        Err(Error::MethodsTooLarge(methods)) => {
            assert_eq!(methods.len(), 1);
            assert_eq!(methods[0].method.as_str(), "big");
            assert_eq!(methods[0].descriptor, "()V");
            assert!(matches!(methods[0].error, jvm::Error::MethodCodeOverflow(_)));
        }
        other => panic!("expected an oversized method, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn misplaced_control_flow() {
    let stray_break = method("f", true, vec![], None, vec![Stmt::Break(None)]);
    assert!(matches!(
        translate_class(&Settings::default(), &sample_class(vec![], vec![stray_break])),
        Err(Error::MisplacedJump(None))
    ));

    let unknown_label = method(
        "h",
        true,
        vec![],
        None,
        vec![Stmt::While {
            label: Some("outer".to_string()),
            condition: Expr::boolean(true),
            body: Box::new(Stmt::Break(Some("inner".to_string()))),
        }],
    );
    assert!(matches!(
        translate_class(&Settings::default(), &sample_class(vec![], vec![unknown_label])),
        Err(Error::MisplacedJump(Some(label))) if label == "inner"
    ));

    let missing_return = method("g", true, vec![], Some(FieldType::int()), vec![]);
    assert!(matches!(
        translate_class(&Settings::default(), &sample_class(vec![], vec![missing_return])),
        Err(Error::UnsupportedNode(_))
    ));
}

#[test]
fn class_files_survive_a_round_trip() {
    let identity = method(
        "identity",
        true,
        vec![FieldType::int()],
        Some(FieldType::int()),
        vec![Stmt::Return(Some(int_local(0)))],
    );
    let class_file = translate_class(&Settings::default(), &sample_class(vec![], vec![identity]))
        .unwrap();
    let bytes = class_file.to_bytes().unwrap();
    assert_eq!(bytes[..4], ClassFile::MAGIC);

    let parsed = ClassFile::parse(&bytes).unwrap();
    assert_eq!(parsed, class_file);
    assert_eq!(parsed.version.major_version, 52);
    assert_eq!(parsed.class_name(parsed.this_class), Some("test/Sample"));
    assert_eq!(parsed.class_name(parsed.super_class), Some("java/lang/Object"));
    assert!(parsed.access_flags.contains(ClassAccessFlags::SUPER));
    assert_eq!(parsed.attributes.len(), 1);
}
